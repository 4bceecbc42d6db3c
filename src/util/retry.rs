//! Bounded retries with linear backoff.
//!
//! Used for tree removal (files transiently locked by build processes that
//! just exited) and for network uploads.

use std::thread;
use std::time::Duration;

use anyhow::Result;

/// Delay applied after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Retry immediately.
    None,
    /// Wait `step * n` after the n-th failed attempt.
    Linear(Duration),
}

impl Backoff {
    /// Delay after the given (1-based) failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::None => Duration::ZERO,
            Backoff::Linear(step) => *step * attempt,
        }
    }
}

/// Retry policy: how many attempts and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, backoff: Backoff) -> Self {
        RetryPolicy {
            max_attempts,
            backoff,
        }
    }

    /// Single attempt, no retries.
    pub const fn once() -> Self {
        Self::new(1, Backoff::None)
    }

    /// Policy for deleting directory trees: 20 attempts, 0.5s linear backoff.
    pub const fn tree_removal() -> Self {
        Self::new(20, Backoff::Linear(Duration::from_millis(500)))
    }

    /// Policy for uploads and other network calls: 3 attempts, 5s linear backoff.
    pub const fn network() -> Self {
        Self::new(3, Backoff::Linear(Duration::from_secs(5)))
    }

    /// Run `op` until it succeeds or attempts are exhausted.
    ///
    /// `op` receives the 1-based attempt number.
    pub fn run<T, F>(&self, what: &str, op: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        self.run_if(what, |_| true, op)
    }

    /// Like [`RetryPolicy::run`], but only retries errors accepted by `retryable`.
    pub fn run_if<T, F, P>(&self, what: &str, mut retryable: P, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
        P: FnMut(&anyhow::Error) -> bool,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && retryable(&e) => {
                    let delay = self.backoff.delay(attempt);
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {:#}; retrying in {:.1}s",
                        what,
                        attempt,
                        attempts,
                        e,
                        delay.as_secs_f32()
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_linear_backoff() {
        let backoff = Backoff::Linear(Duration::from_millis(500));
        assert_eq!(backoff.delay(1), Duration::from_millis(500));
        assert_eq!(backoff.delay(4), Duration::from_millis(2000));
        assert_eq!(Backoff::None.delay(7), Duration::ZERO);
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(5, Backoff::None);
        let mut calls = 0;

        let value = policy
            .run("flaky op", |attempt| {
                calls += 1;
                if attempt < 3 {
                    Err(anyhow!("busy"))
                } else {
                    Ok(attempt)
                }
            })
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(4, Backoff::None);
        let mut calls = 0;

        let result: Result<()> = policy.run("always failing", |_| {
            calls += 1;
            Err(anyhow!("nope"))
        });

        assert!(result.is_err());
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_non_retryable_error_stops_immediately() {
        let policy = RetryPolicy::new(10, Backoff::None);
        let mut calls = 0;

        let result: Result<()> = policy.run_if(
            "fatal op",
            |e| !e.to_string().contains("fatal"),
            |_| {
                calls += 1;
                Err(anyhow!("fatal: bad request"))
            },
        );

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        let policy = RetryPolicy::new(0, Backoff::None);
        let mut calls = 0;
        let _ = policy.run("once", |_| {
            calls += 1;
            Ok(())
        });
        assert_eq!(calls, 1);
    }
}

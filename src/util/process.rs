//! Subprocess execution utilities.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output, Stdio};

use anyhow::{Context, Result};
use thiserror::Error;

/// A subprocess that ran but did not succeed.
#[derive(Debug, Error)]
#[error("`{command}` failed with exit code {code:?}{}", stderr_suffix(.stderr))]
pub struct ProcessError {
    pub command: String,
    pub code: Option<i32>,
    pub stderr: String,
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.trim().is_empty() {
        String::new()
    } else {
        format!("\n{}", stderr.trim_end())
    }
}

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable for the child only.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Get the program path.
    pub fn get_program(&self) -> &Path {
        &self.program
    }

    /// Get the arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }

    /// Execute with captured stdout/stderr and wait for completion.
    pub fn exec(&self) -> Result<Output> {
        let mut cmd = self.build_command();
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("running `{}`", self.display_command());

        cmd.output()
            .with_context(|| format!("failed to spawn `{}`", self.program.display()))
    }

    /// Execute with captured output and require success.
    pub fn exec_and_check(&self) -> Result<Output> {
        let output = self.exec()?;
        if !output.status.success() {
            return Err(ProcessError {
                command: self.display_command(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
            .into());
        }
        Ok(output)
    }

    /// Execute and return trimmed stdout, requiring success.
    pub fn stdout_string(&self) -> Result<String> {
        let output = self.exec_and_check()?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Execute with stdout captured and stderr streamed to the terminal.
    ///
    /// Returns stdout, requiring success.
    pub fn capture_stdout(&self) -> Result<String> {
        let mut cmd = self.build_command();
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit());

        tracing::debug!("running `{}`", self.display_command());

        let output = cmd
            .output()
            .with_context(|| format!("failed to spawn `{}`", self.program.display()))?;
        if !output.status.success() {
            return Err(ProcessError {
                command: self.display_command(),
                code: output.status.code(),
                stderr: String::new(),
            }
            .into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Execute with inherited stdio and return the status.
    pub fn status(&self) -> Result<ExitStatus> {
        let mut cmd = self.build_command();

        tracing::debug!("running `{}`", self.display_command());

        cmd.status()
            .with_context(|| format!("failed to execute `{}`", self.program.display()))
    }

    /// Execute with inherited stdio and require success.
    pub fn run(&self) -> Result<()> {
        let status = self.status()?;
        if !status.success() {
            return Err(ProcessError {
                command: self.display_command(),
                code: status.code(),
                stderr: String::new(),
            }
            .into());
        }
        Ok(())
    }

    /// Display the command for logs and error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Whether an error chain was caused by a subprocess exiting unsuccessfully.
pub fn is_process_failure(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<ProcessError>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_stdout_string() {
        let out = ProcessBuilder::new("echo").arg("hello").stdout_string().unwrap();
        assert_eq!(out, "hello");
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_is_process_error() {
        let err = ProcessBuilder::new("sh")
            .args(["-c", "echo oops >&2; exit 3"])
            .exec_and_check()
            .unwrap_err();

        assert!(is_process_failure(&err));
        let process_err = err.downcast_ref::<ProcessError>().unwrap();
        assert_eq!(process_err.code, Some(3));
        assert!(process_err.stderr.contains("oops"));
    }

    #[test]
    fn test_spawn_failure_is_not_process_error() {
        let err = ProcessBuilder::new("definitely-not-a-real-tool-1234")
            .exec()
            .unwrap_err();
        assert!(!is_process_failure(&err));
    }

    #[test]
    fn test_display_command() {
        let pb = ProcessBuilder::new("conan").args(["cache", "clean", "*"]);
        assert_eq!(pb.display_command(), "conan cache clean *");
    }
}

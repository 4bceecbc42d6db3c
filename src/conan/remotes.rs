//! Conan remote management.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::conan::Conan;

/// A configured Conan remote, as reported by `conan remote list --format json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Remote {
    pub name: String,
    pub url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// List configured remotes.
pub fn list_remotes(conan: &Conan) -> Result<Vec<Remote>> {
    let output = conan.output(["remote", "list", "--format", "json"])?;
    serde_json::from_str(&output).context("failed to parse `conan remote list` output")
}

/// What [`add_remote`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteChange {
    Added,
    Updated,
    Unchanged,
}

/// Add a remote, or point an existing remote of that name at `url`.
pub fn add_remote(conan: &Conan, name: &str, url: &str) -> Result<RemoteChange> {
    let remotes = list_remotes(conan)?;

    if let Some(existing) = remotes.iter().find(|r| r.name == name) {
        if existing.url == url {
            return Ok(RemoteChange::Unchanged);
        }
        tracing::info!("updating remote `{}` to {}", name, url);
        conan.run(["remote", "update", name, "--url", url])?;
        return Ok(RemoteChange::Updated);
    }

    tracing::info!("adding remote `{}` at {}", name, url);
    conan.run(["remote", "add", name, url])?;
    Ok(RemoteChange::Added)
}

/// Remove a remote.
pub fn remove_remote(conan: &Conan, name: &str) -> Result<()> {
    conan.run(["remote", "remove", name])
}

/// Removes the remotes it added when dropped.
#[must_use = "added remotes are removed when the guard is dropped"]
pub struct TemporaryRemotes<'a> {
    conan: &'a Conan,
    added: Vec<String>,
}

impl<'a> TemporaryRemotes<'a> {
    pub fn new(conan: &'a Conan) -> Self {
        TemporaryRemotes {
            conan,
            added: Vec::new(),
        }
    }

    /// Add (or update) a remote; it is removed on drop only if it was added here.
    pub fn add(&mut self, name: &str, url: &str) -> Result<()> {
        if add_remote(self.conan, name, url)? == RemoteChange::Added {
            self.added.push(name.to_string());
        }
        Ok(())
    }
}

impl Drop for TemporaryRemotes<'_> {
    fn drop(&mut self) {
        for name in self.added.drain(..).rev() {
            if let Err(e) = remove_remote(self.conan, &name) {
                tracing::warn!("failed to remove remote `{}`: {:#}", name, e);
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::FakeConan;
    use tempfile::TempDir;

    const REMOTES: &str = r#"[
        {"name": "conancenter", "url": "https://center.conan.io", "verify_ssl": true, "enabled": true},
        {"name": "audacity", "url": "https://old.example.com", "verify_ssl": true, "enabled": false}
    ]"#;

    #[test]
    fn test_list_remotes() {
        let tmp = TempDir::new().unwrap();
        let fake = FakeConan::install(tmp.path());
        fake.respond("remotes.json", REMOTES);

        let remotes = list_remotes(&fake.conan()).unwrap();
        assert_eq!(remotes.len(), 2);
        assert_eq!(remotes[1].name, "audacity");
        assert!(!remotes[1].enabled);
    }

    #[test]
    fn test_add_update_unchanged() {
        let tmp = TempDir::new().unwrap();
        let fake = FakeConan::install(tmp.path());
        fake.respond("remotes.json", REMOTES);
        let conan = fake.conan();

        assert_eq!(
            add_remote(&conan, "new", "https://new.example.com").unwrap(),
            RemoteChange::Added
        );
        assert_eq!(
            add_remote(&conan, "audacity", "https://new.example.com").unwrap(),
            RemoteChange::Updated
        );
        assert_eq!(
            add_remote(&conan, "conancenter", "https://center.conan.io").unwrap(),
            RemoteChange::Unchanged
        );

        assert_eq!(
            fake.calls_starting_with("remote add"),
            vec!["remote add new https://new.example.com"]
        );
        assert_eq!(
            fake.calls_starting_with("remote update"),
            vec!["remote update audacity --url https://new.example.com"]
        );
    }

    #[test]
    fn test_temporary_remotes_remove_only_added() {
        let tmp = TempDir::new().unwrap();
        let fake = FakeConan::install(tmp.path());
        fake.respond("remotes.json", REMOTES);
        let conan = fake.conan();

        {
            let mut remotes = TemporaryRemotes::new(&conan);
            remotes.add("audacity", "https://new.example.com").unwrap();
            remotes.add("fresh", "https://fresh.example.com").unwrap();
        }

        assert_eq!(fake.calls_starting_with("remote remove"), vec!["remote remove fresh"]);
    }
}

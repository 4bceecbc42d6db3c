//! Upload of debug information files to Sentry with `sentry-cli`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::platform::Platform;
use crate::debug::harvest::harvest;
use crate::debug::{BuiltPackage, DebugProcessor};
use crate::util::config::Config;
use crate::util::fs::{ensure_dir, remove_tree};
use crate::util::process::{find_executable, ProcessBuilder};
use crate::util::retry::RetryPolicy;

/// Sentry connection settings.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SentrySettings {
    /// `sentry-cli` executable, if found.
    pub cli: Option<PathBuf>,
    pub host: Option<String>,
    pub auth_token: Option<String>,
    pub org_slug: Option<String>,
    pub project_slug: Option<String>,
}

impl std::fmt::Debug for SentrySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentrySettings")
            .field("cli", &self.cli)
            .field("host", &self.host)
            .field("auth_token", &self.auth_token.as_ref().map(|_| ".."))
            .field("org_slug", &self.org_slug)
            .field("project_slug", &self.project_slug)
            .finish()
    }
}

impl SentrySettings {
    /// Host and slugs from configuration, the token from `SENTRY_AUTH_TOKEN`.
    pub fn from_config<F>(config: &Config, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        SentrySettings {
            cli: find_executable("sentry-cli"),
            host: config.sentry.host.clone(),
            auth_token: lookup("SENTRY_AUTH_TOKEN").filter(|t| !t.is_empty()),
            org_slug: config.sentry.org_slug.clone(),
            project_slug: config.sentry.project_slug.clone(),
        }
    }
}

/// Host URL with `https://` added when no scheme is given.
pub fn normalize_host(host: &str) -> String {
    if host.starts_with("http") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

#[derive(Debug)]
struct Active {
    cli: PathBuf,
    host: String,
    auth_token: String,
    org: String,
    project: String,
}

#[derive(Debug)]
pub struct SentryProcessor {
    settings: SentrySettings,
    platform: Platform,
    dir: PathBuf,
    skip_upload: bool,
    retry: RetryPolicy,
    active: Option<Active>,
}

impl SentryProcessor {
    pub fn new(settings: SentrySettings, platform: Platform, dir: PathBuf, skip_upload: bool) -> Self {
        SentryProcessor {
            settings,
            platform,
            dir,
            skip_upload,
            retry: RetryPolicy::network(),
            active: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Directory holding harvested files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn upload_args(&self, active: &Active) -> Vec<String> {
        vec![
            "--auth-token".to_string(),
            active.auth_token.clone(),
            "--url".to_string(),
            active.host.clone(),
            "upload-dif".to_string(),
            self.dir.to_string_lossy().into_owned(),
            "--org".to_string(),
            active.org.clone(),
            "--project".to_string(),
            active.project.clone(),
            "--include-sources".to_string(),
            "--log-level=info".to_string(),
        ]
    }
}

fn required(value: &Option<String>, what: &str) -> Option<String> {
    let value = value.as_ref().filter(|v| !v.is_empty()).cloned();
    if value.is_none() {
        tracing::info!("{} not set, skipping Sentry upload", what);
    }
    value
}

impl DebugProcessor for SentryProcessor {
    fn name(&self) -> &'static str {
        "sentry"
    }

    fn activate(&mut self, directory: Option<&Path>) -> Result<bool> {
        let Some(cli) = self.settings.cli.clone() else {
            tracing::info!("sentry-cli not found, skipping Sentry upload");
            return Ok(false);
        };
        let Some(host) = required(&self.settings.host, "SENTRY_HOST") else {
            return Ok(false);
        };
        let Some(auth_token) = required(&self.settings.auth_token, "SENTRY_AUTH_TOKEN") else {
            return Ok(false);
        };
        let Some(org) = required(&self.settings.org_slug, "SENTRY_ORG_SLUG") else {
            return Ok(false);
        };
        let Some(project) = required(&self.settings.project_slug, "SENTRY_PROJECT_SLUG") else {
            return Ok(false);
        };

        if let Some(directory) = directory {
            self.dir = directory.to_path_buf();
        }
        ensure_dir(&self.dir)?;

        self.active = Some(Active {
            cli,
            host: normalize_host(&host),
            auth_token,
            org,
            project,
        });
        Ok(true)
    }

    fn process(&mut self, package: &BuiltPackage<'_>) -> Result<()> {
        let dest = self
            .dir
            .join(package.reference.name())
            .join(package.reference.version());
        let count = harvest(&self.platform, package.build_dir, &dest)
            .with_context(|| format!("failed to harvest debug info of {}", package.reference))?;
        tracing::info!("collected {} binaries of {} for Sentry", count, package.reference);
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };

        if self.skip_upload {
            tracing::info!("keeping Sentry debug files in {}", self.dir.display());
            return Ok(());
        }

        if self.dir.is_dir() {
            let args = self.upload_args(&active);
            self.retry.run("sentry-cli upload-dif", |_| {
                ProcessBuilder::new(&active.cli).args(&args).run()
            })?;
        }

        remove_tree(&self.dir)?;
        Ok(())
    }

    fn discard(&mut self) -> Result<()> {
        self.active = None;
        remove_tree(&self.dir)?;
        Ok(())
    }
}

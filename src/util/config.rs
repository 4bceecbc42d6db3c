//! Configuration file support for conan-utils.
//!
//! Two configuration file locations are read:
//! - Global: `<config dir>/conan-utils/config.toml` - User-wide defaults
//! - Project: `<output dir>/config.toml` - Per-checkout overrides
//!
//! Project config takes precedence over global config, environment variables
//! take precedence over both, and command line flags win over everything.
//! Secrets are never read from files.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::util::archive::Compression;

/// Default Conan remote holding recipes.
pub const DEFAULT_RECIPES_REMOTE: &str =
    "https://artifactory.audacityteam.org/artifactory/api/conan/audacity-recipes-conan2";

/// Default Conan remote holding recipes and binaries.
pub const DEFAULT_BINARIES_REMOTE: &str =
    "https://artifactory.audacityteam.org/artifactory/api/conan/audacity-binaries-conan2";

static PROJECT_DIRS: LazyLock<Option<ProjectDirs>> =
    LazyLock::new(|| ProjectDirs::from("org", "audacityteam", "conan-utils"));

/// conan-utils configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Conan remotes used by `upload`
    pub remotes: RemotesConfig,

    /// Artifact store locations
    pub artifactory: ArtifactoryConfig,

    /// Sentry debug-file upload settings
    pub sentry: SentryConfig,

    /// Build settings
    pub build: BuildConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemotesConfig {
    pub recipes: Option<String>,
    pub binaries: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactoryConfig {
    /// Repository holding remote cache bundles
    pub cache_url: Option<String>,

    /// Repository mirroring third-party source archives
    pub mirror_url: Option<String>,

    /// Repository serving as a Windows symbol server
    pub symbols_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SentryConfig {
    pub host: Option<String>,
    pub org_slug: Option<String>,
    pub project_slug: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Keep downloaded sources after building
    pub keep_sources: bool,

    /// Debug processors enabled when none are given on the command line
    pub debug_processors: Vec<String>,

    /// Default compression for cache bundles
    pub compression: Option<String>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        merge_opt(&mut self.remotes.recipes, other.remotes.recipes);
        merge_opt(&mut self.remotes.binaries, other.remotes.binaries);

        merge_opt(&mut self.artifactory.cache_url, other.artifactory.cache_url);
        merge_opt(&mut self.artifactory.mirror_url, other.artifactory.mirror_url);
        merge_opt(&mut self.artifactory.symbols_url, other.artifactory.symbols_url);

        merge_opt(&mut self.sentry.host, other.sentry.host);
        merge_opt(&mut self.sentry.org_slug, other.sentry.org_slug);
        merge_opt(&mut self.sentry.project_slug, other.sentry.project_slug);

        if other.build.keep_sources {
            self.build.keep_sources = true;
        }
        if !other.build.debug_processors.is_empty() {
            self.build.debug_processors = other.build.debug_processors;
        }
        merge_opt(&mut self.build.compression, other.build.compression);
    }

    /// Apply environment variable overrides.
    ///
    /// `lookup` is `std::env::var(..).ok()` in production; tests pass a map.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        merge_opt(&mut self.remotes.recipes, get("CONAN_RECIPES_REMOTE"));
        merge_opt(&mut self.remotes.binaries, get("CONAN_BINARIES_REMOTE"));
        merge_opt(&mut self.artifactory.cache_url, get("ARTIFACTORY_CACHE_URL"));
        merge_opt(&mut self.artifactory.mirror_url, get("ARTIFACTORY_MIRROR_URL"));
        merge_opt(&mut self.artifactory.symbols_url, get("ARTIFACTORY_SYMBOLS_URL"));
        merge_opt(&mut self.sentry.host, get("SENTRY_HOST"));
        merge_opt(&mut self.sentry.org_slug, get("SENTRY_ORG_SLUG"));
        merge_opt(&mut self.sentry.project_slug, get("SENTRY_PROJECT_SLUG"));
    }

    /// Recipes remote URL, falling back to the default remote.
    pub fn recipes_remote(&self) -> &str {
        self.remotes
            .recipes
            .as_deref()
            .unwrap_or(DEFAULT_RECIPES_REMOTE)
    }

    /// Binaries remote URL, falling back to the default remote.
    pub fn binaries_remote(&self) -> &str {
        self.remotes
            .binaries
            .as_deref()
            .unwrap_or(DEFAULT_BINARIES_REMOTE)
    }

    /// Parse the configured bundle compression.
    pub fn compression(&self) -> Result<Compression> {
        match &self.build.compression {
            Some(name) => name
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("invalid `build.compression` in config"),
            None => Ok(Compression::default()),
        }
    }
}

fn merge_opt<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (`<output dir>/config.toml`)
/// 2. Global config (`<config dir>/conan-utils/config.toml`)
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        if global_path.exists() {
            config.merge(Config::load_or_default(global_path));
        }
    }

    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    config
}

/// Get the global config path.
pub fn global_config_path() -> Option<PathBuf> {
    PROJECT_DIRS
        .as_ref()
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// A problem with the recipes checkout or the invocation.
///
/// These are fatal and never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no package config for `{package}`, cannot default its version, user and channel")]
    MissingPackageConfig { package: String },

    #[error("no version given for `{package}` and its package config has none")]
    MissingVersion { package: String },

    #[error("profile `{name}` not found in {}", dir.display())]
    MissingProfile { name: String, dir: PathBuf },

    #[error("build order file not found: {}", path.display())]
    MissingBuildOrder { path: PathBuf },

    #[error("recipe `{package}` not found: {} does not exist", path.display())]
    MissingRecipe { package: String, path: PathBuf },

    #[error("unknown version `{version}` of `{package}` (available: {})", available.join(", "))]
    UnknownVersion {
        package: String,
        version: String,
        available: Vec<String>,
    },

    #[error("recipe folder for `{package}/{version}` not found: {}", path.display())]
    MissingRecipeFolder {
        package: String,
        version: String,
        path: PathBuf,
    },

    #[error("invalid package reference `{reference}`: {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("{setting} is not set ({hint})")]
    MissingSetting {
        setting: &'static str,
        hint: &'static str,
    },
}

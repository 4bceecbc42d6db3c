//! Per-package build configuration.
//!
//! Package configs live in `config/packages/<name>.yml`, with optional
//! per-platform overrides in `config/packages/<platform>/<name>.yml`:
//!
//! ```yaml
//! config:
//!   version: 1.3.1
//!   options: "shared=False fPIC=True"
//!   build_tool: false
//!   allow-build-missing: true
//! ```
//!
//! `config/stable_packages.yml` decides which package versions go to the
//! `stable` channel; everything else is published to `testing`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};

use crate::core::error::ConfigError;
use crate::core::platform::Platform;
use crate::util::context::Directories;

/// User packages are published under when nothing else is configured.
pub const DEFAULT_USER: &str = "audacity";

pub const STABLE_CHANNEL: &str = "stable";
pub const TESTING_CHANNEL: &str = "testing";

/// Build configuration of one package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PackageConfig {
    /// Default version built for this package.
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub version: Option<String>,

    pub user: Option<String>,

    pub channel: Option<String>,

    /// Space separated `key=value` host options.
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub options: Option<String>,

    /// Runs on the build machine; built with the build profile only.
    #[serde(default)]
    pub build_tool: bool,

    /// Python requirement; exported, never built.
    #[serde(default)]
    pub python_require: bool,

    #[serde(default, rename = "allow-build-missing", alias = "allow_build_missing")]
    pub allow_build_missing: bool,

    #[serde(default, rename = "use-both-profiles", alias = "use_both_profiles")]
    pub use_both_profiles: bool,
}

impl PackageConfig {
    /// Host options as Conan `key=value` pairs.
    pub fn host_options(&self) -> Vec<String> {
        self.options
            .as_deref()
            .map(|o| o.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Parse a package config document.
    pub fn parse(contents: &str) -> Result<Self> {
        let file: PackageConfigFile = serde_yaml::from_str(contents)?;
        Ok(file.config)
    }

    /// Load a package config file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read package config: {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("failed to parse package config: {}", path.display()))
    }
}

#[derive(Deserialize)]
struct PackageConfigFile {
    config: PackageConfig,
}

/// Accept YAML scalars of any type as strings; `version: 1.3` parses as a float.
fn optional_scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_yaml::Value::Null) => Ok(None),
        Some(v) => scalar_to_string(&v)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("expected a string or number")),
    }
}

/// String form of a YAML scalar.
pub fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Versions listed for a package in `stable_packages.yml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StableVersions {
    /// Every version is stable.
    All,
    /// Only these versions are stable.
    Only(Vec<String>),
}

impl StableVersions {
    pub fn contains(&self, version: &str) -> bool {
        match self {
            StableVersions::All => true,
            StableVersions::Only(versions) => versions.iter().any(|v| v == version),
        }
    }
}

impl<'de> Deserialize<'de> for StableVersions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_yaml::Value::deserialize(deserializer)?;
        match &value {
            serde_yaml::Value::Sequence(items) => items
                .iter()
                .map(|item| {
                    scalar_to_string(item)
                        .ok_or_else(|| serde::de::Error::custom("expected a version string"))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(StableVersions::Only),
            other => match scalar_to_string(other) {
                Some(s) if s == "*" => Ok(StableVersions::All),
                Some(s) => Ok(StableVersions::Only(vec![s])),
                None => Err(serde::de::Error::custom(
                    "expected `*`, a version or a list of versions",
                )),
            },
        }
    }
}

/// Contents of `stable_packages.yml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StablePackages {
    #[serde(default)]
    pub packages: HashMap<String, StableVersions>,
}

impl StablePackages {
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Channel for a package version.
    pub fn channel(&self, name: &str, version: &str) -> &'static str {
        match self.packages.get(name) {
            Some(versions) if versions.contains(version) => STABLE_CHANNEL,
            _ => TESTING_CHANNEL,
        }
    }
}

/// Loads package configs on first use and keeps them for the process lifetime.
#[derive(Debug)]
pub struct PackageConfigProvider {
    packages_dir: PathBuf,
    platform_packages_dir: PathBuf,
    stable: Option<StablePackages>,
    configs: RefCell<HashMap<String, Option<PackageConfig>>>,
}

impl PackageConfigProvider {
    /// Create a provider for a checkout, reading `stable_packages.yml` if present.
    pub fn new(dirs: &Directories, platform: &Platform) -> Result<Self> {
        let stable_path = dirs.stable_packages_path();
        let stable = if stable_path.exists() {
            let contents = crate::util::fs::read_to_string(&stable_path)?;
            Some(StablePackages::parse(&contents).with_context(|| {
                format!("failed to parse stable packages: {}", stable_path.display())
            })?)
        } else {
            None
        };

        Ok(PackageConfigProvider {
            packages_dir: dirs.config_packages_dir(),
            platform_packages_dir: dirs.config_platform_packages_dir(platform),
            stable,
            configs: RefCell::new(HashMap::new()),
        })
    }

    /// Path of the config file used for `name`, preferring the platform override.
    pub fn package_config_path(&self, name: &str) -> Option<PathBuf> {
        let file_name = format!("{}.yml", name);
        [
            self.platform_packages_dir.join(&file_name),
            self.packages_dir.join(&file_name),
        ]
        .into_iter()
        .find(|p| p.is_file())
    }

    /// Config of a package, or `None` if it has no config file.
    pub fn package_config(&self, name: &str) -> Result<Option<PackageConfig>> {
        if let Some(cached) = self.configs.borrow().get(name) {
            return Ok(cached.clone());
        }

        let config = match self.package_config_path(name) {
            Some(path) => {
                tracing::debug!("loading package config {}", path.display());
                Some(PackageConfig::load(&path)?)
            }
            None => None,
        };

        self.configs
            .borrow_mut()
            .insert(name.to_string(), config.clone());
        Ok(config)
    }

    /// Config of a package; missing config is an error.
    pub fn require_package_config(&self, name: &str) -> Result<PackageConfig> {
        self.package_config(name)?.ok_or_else(|| {
            ConfigError::MissingPackageConfig {
                package: name.to_string(),
            }
            .into()
        })
    }

    /// `stable` or `testing`.
    pub fn channel(&self, name: &str, version: &str) -> &'static str {
        match &self.stable {
            Some(stable) => stable.channel(name, version),
            None => TESTING_CHANNEL,
        }
    }

    pub fn default_user(&self) -> &'static str {
        DEFAULT_USER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_package_config() {
        let config = PackageConfig::parse(
            r#"
config:
  version: 1.3
  options: "shared=False  fPIC=True"
  build_tool: true
  allow-build-missing: true
"#,
        )
        .unwrap();

        assert_eq!(config.version.as_deref(), Some("1.3"));
        assert_eq!(config.host_options(), vec!["shared=False", "fPIC=True"]);
        assert!(config.build_tool);
        assert!(config.allow_build_missing);
        assert!(!config.use_both_profiles);
        assert!(!config.python_require);
    }

    #[test]
    fn test_stable_channel() {
        let stable = StablePackages::parse(
            r#"
packages:
  zlib: "*"
  expat: 2.5.0
  wxwidgets: [3.1.3, 3.2.4]
"#,
        )
        .unwrap();

        assert_eq!(stable.channel("zlib", "1.3"), STABLE_CHANNEL);
        assert_eq!(stable.channel("expat", "2.5.0"), STABLE_CHANNEL);
        assert_eq!(stable.channel("expat", "2.6.0"), TESTING_CHANNEL);
        assert_eq!(stable.channel("wxwidgets", "3.2.4"), STABLE_CHANNEL);
        assert_eq!(stable.channel("wxwidgets", "3.3.0"), TESTING_CHANNEL);
        assert_eq!(stable.channel("portaudio", "19"), TESTING_CHANNEL);
    }

    #[test]
    fn test_platform_override_wins() {
        let tmp = TempDir::new().unwrap();
        let dirs = Directories::new(tmp.path(), tmp.path().join("out"));
        let packages = dirs.config_packages_dir();
        fs::create_dir_all(packages.join("win32")).unwrap();
        fs::write(packages.join("zlib.yml"), "config:\n  version: 1.3\n").unwrap();
        fs::write(
            packages.join("win32/zlib.yml"),
            "config:\n  version: 1.2.13\n",
        )
        .unwrap();

        let linux = PackageConfigProvider::new(&dirs, &Platform::Linux).unwrap();
        let win = PackageConfigProvider::new(&dirs, &Platform::Win32).unwrap();

        assert_eq!(
            linux.package_config("zlib").unwrap().unwrap().version.as_deref(),
            Some("1.3")
        );
        assert_eq!(
            win.package_config("zlib").unwrap().unwrap().version.as_deref(),
            Some("1.2.13")
        );
    }

    #[test]
    fn test_configs_are_loaded_once() {
        let tmp = TempDir::new().unwrap();
        let dirs = Directories::new(tmp.path(), tmp.path().join("out"));
        let packages = dirs.config_packages_dir();
        fs::create_dir_all(&packages).unwrap();
        fs::write(packages.join("zlib.yml"), "config:\n  version: 1.3\n").unwrap();

        let provider = PackageConfigProvider::new(&dirs, &Platform::Linux).unwrap();
        assert!(provider.package_config("zlib").unwrap().is_some());

        fs::remove_file(packages.join("zlib.yml")).unwrap();
        assert!(provider.package_config("zlib").unwrap().is_some());
    }

    #[test]
    fn test_missing_config_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let dirs = Directories::new(tmp.path(), tmp.path().join("out"));
        let provider = PackageConfigProvider::new(&dirs, &Platform::Linux).unwrap();

        let err = provider.require_package_config("nope").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::MissingPackageConfig { .. })
        ));
        assert_eq!(provider.channel("nope", "1.0"), TESTING_CHANNEL);
    }
}

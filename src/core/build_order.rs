//! Build order files.
//!
//! ```yaml
//! build_order:
//!   - platforms: "*"
//!     packages: [zlib, expat]
//!   - platforms: [win32]
//!     packages: [breakpad]
//! ```
//!
//! Groups are kept in file order and packages in listed order. A group
//! applies when its platforms are `*` or include the host platform.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};

use crate::core::error::ConfigError;
use crate::core::platform::Platform;
use crate::util::context::Directories;

/// A parsed build order document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BuildOrder {
    pub build_order: Vec<BuildOrderEntry>,
}

/// One group of packages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BuildOrderEntry {
    pub platforms: Platforms,
    #[serde(default)]
    pub packages: Vec<String>,
}

/// Platforms a group applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platforms {
    Any,
    Only(Vec<String>),
}

impl Platforms {
    pub fn includes(&self, platform: &Platform) -> bool {
        match self {
            Platforms::Any => true,
            Platforms::Only(names) => names
                .iter()
                .any(|n| n.eq_ignore_ascii_case(platform.as_str())),
        }
    }
}

impl<'de> Deserialize<'de> for Platforms {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::One(s) if s.trim() == "*" => Platforms::Any,
            Raw::One(s) => Platforms::Only(vec![s]),
            Raw::Many(names) => Platforms::Only(names),
        })
    }
}

impl BuildOrder {
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Load a build order file; a missing file is a configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ConfigError::MissingBuildOrder {
                path: path.to_path_buf(),
            }
            .into());
        }
        let contents = crate::util::fs::read_to_string(path)?;
        Self::parse(&contents)
            .with_context(|| format!("failed to parse build order: {}", path.display()))
    }

    /// Flatten to the package names applicable to `platform`.
    ///
    /// Duplicates are preserved.
    pub fn resolve(&self, platform: &Platform) -> Vec<String> {
        self.build_order
            .iter()
            .filter(|entry| entry.platforms.includes(platform))
            .flat_map(|entry| entry.packages.iter().cloned())
            .collect()
    }
}

/// Path of a build order given by name or path.
///
/// `None` selects `config/build_order.yml`; relative names resolve against `config/`.
pub fn build_order_path(dirs: &Directories, name: Option<&Path>) -> PathBuf {
    match name {
        Some(p) if p.is_absolute() => p.to_path_buf(),
        Some(p) => dirs.config_dir().join(p),
        None => dirs.default_build_order_path(),
    }
}

/// Load and resolve a build order for `platform`.
pub fn load_build_order(
    dirs: &Directories,
    name: Option<&Path>,
    platform: &Platform,
) -> Result<Vec<String>> {
    let path = build_order_path(dirs, name);
    let order = BuildOrder::load(&path)?;
    let packages = order.resolve(platform);
    tracing::debug!(
        "build order {} for {}: {}",
        path.display(),
        platform,
        packages.join(", ")
    );
    Ok(packages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
build_order:
  - platforms: "*"
    packages: [a, b]
  - platforms: [win32]
    packages: [c]
  - platforms: [linux, darwin]
    packages: [d, a]
"#;

    #[test]
    fn test_resolve_linux() {
        let order = BuildOrder::parse(SAMPLE).unwrap();
        assert_eq!(order.resolve(&Platform::Linux), vec!["a", "b", "d", "a"]);
    }

    #[test]
    fn test_resolve_windows() {
        let order = BuildOrder::parse(SAMPLE).unwrap();
        assert_eq!(order.resolve(&Platform::Win32), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_two_group_scenario() {
        let order = BuildOrder::parse(
            "build_order:\n  - platforms: \"*\"\n    packages: [a, b]\n  - platforms: [win32]\n    packages: [c]\n",
        )
        .unwrap();
        assert_eq!(order.resolve(&Platform::Linux), vec!["a", "b"]);
    }

    #[test]
    fn test_platform_match_ignores_case() {
        let order =
            BuildOrder::parse("build_order:\n  - platforms: [Darwin]\n    packages: [x]\n").unwrap();
        assert_eq!(order.resolve(&Platform::Darwin), vec!["x"]);
        assert!(order.resolve(&Platform::Linux).is_empty());
    }

    #[test]
    fn test_single_platform_string() {
        let order =
            BuildOrder::parse("build_order:\n  - platforms: linux\n    packages: [x]\n").unwrap();
        assert_eq!(order.resolve(&Platform::Linux), vec!["x"]);
        assert!(order.resolve(&Platform::Win32).is_empty());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let dirs = Directories::new(tmp.path(), tmp.path().join("out"));

        let err = load_build_order(&dirs, None, &Platform::Linux).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::MissingBuildOrder { .. })
        ));
    }

    #[test]
    fn test_named_build_order() {
        let tmp = TempDir::new().unwrap();
        let dirs = Directories::new(tmp.path(), tmp.path().join("out"));
        fs::create_dir_all(dirs.config_dir()).unwrap();
        fs::write(dirs.config_dir().join("minimal.yml"), SAMPLE).unwrap();

        let packages =
            load_build_order(&dirs, Some(Path::new("minimal.yml")), &Platform::Win32).unwrap();
        assert_eq!(packages, vec!["a", "b", "c"]);

        let absolute = dirs.config_dir().join("minimal.yml");
        assert_eq!(build_order_path(&dirs, Some(&absolute)), absolute);
    }
}

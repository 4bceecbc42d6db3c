//! Conan host/build profile selection.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::core::error::ConfigError;

/// Resolved host and build profile paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConanProfiles {
    host: PathBuf,
    build: PathBuf,
}

impl ConanProfiles {
    /// Resolve profiles by name or path.
    ///
    /// When only one profile is given it is used for both contexts.
    pub fn new(profiles_dir: &Path, host: Option<&str>, build: Option<&str>) -> Result<Self> {
        let (host, build) = match (host, build) {
            (Some(h), Some(b)) => (h, b),
            (Some(h), None) => {
                tracing::debug!("no build profile given, using host profile `{}`", h);
                (h, h)
            }
            (None, Some(b)) => {
                tracing::debug!("no host profile given, using build profile `{}`", b);
                (b, b)
            }
            (None, None) => {
                return Err(ConfigError::MissingSetting {
                    setting: "Conan profile",
                    hint: "pass --profile-host or --profile-build",
                }
                .into())
            }
        };

        Ok(ConanProfiles {
            host: resolve_profile_path(profiles_dir, host)?,
            build: resolve_profile_path(profiles_dir, build)?,
        })
    }

    pub fn host(&self) -> &Path {
        &self.host
    }

    pub fn build(&self) -> &Path {
        &self.build
    }

    /// Profile used for the host context of a package.
    ///
    /// Build tools run on the build machine, so they get the build profile.
    pub fn profile_for(&self, build_context: bool) -> &Path {
        if build_context {
            &self.build
        } else {
            &self.host
        }
    }
}

/// Find a profile: absolute paths as given, names relative to `profiles_dir`,
/// trying `<name>` and then `<name>.profile`.
pub fn resolve_profile_path(profiles_dir: &Path, name: &str) -> Result<PathBuf> {
    let base = Path::new(name);
    let base = if base.is_absolute() {
        base.to_path_buf()
    } else {
        profiles_dir.join(base)
    };

    if base.is_file() {
        return Ok(base);
    }

    let mut with_ext = base.into_os_string();
    with_ext.push(".profile");
    let with_ext = PathBuf::from(with_ext);
    if with_ext.is_file() {
        return Ok(with_ext);
    }

    Err(ConfigError::MissingProfile {
        name: name.to_string(),
        dir: profiles_dir.to_path_buf(),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn profiles_dir() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("linux-x86_64.profile"), "[settings]\n").unwrap();
        fs::write(tmp.path().join("linux-armv8"), "[settings]\n").unwrap();
        tmp
    }

    #[test]
    fn test_resolve_with_and_without_extension() {
        let tmp = profiles_dir();
        assert_eq!(
            resolve_profile_path(tmp.path(), "linux-x86_64").unwrap(),
            tmp.path().join("linux-x86_64.profile")
        );
        assert_eq!(
            resolve_profile_path(tmp.path(), "linux-armv8").unwrap(),
            tmp.path().join("linux-armv8")
        );
    }

    #[test]
    fn test_missing_profile() {
        let tmp = profiles_dir();
        let err = resolve_profile_path(tmp.path(), "win-x64").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::MissingProfile { .. })
        ));
    }

    #[test]
    fn test_single_profile_used_for_both() {
        let tmp = profiles_dir();
        let profiles = ConanProfiles::new(tmp.path(), Some("linux-x86_64"), None).unwrap();
        assert_eq!(profiles.host(), profiles.build());

        let profiles = ConanProfiles::new(tmp.path(), None, Some("linux-armv8")).unwrap();
        assert_eq!(profiles.host(), tmp.path().join("linux-armv8"));
    }

    #[test]
    fn test_profile_for_context() {
        let tmp = profiles_dir();
        let profiles =
            ConanProfiles::new(tmp.path(), Some("linux-armv8"), Some("linux-x86_64")).unwrap();
        assert_eq!(profiles.profile_for(false), tmp.path().join("linux-armv8"));
        assert_eq!(
            profiles.profile_for(true),
            tmp.path().join("linux-x86_64.profile")
        );
    }

    #[test]
    fn test_no_profiles() {
        let tmp = profiles_dir();
        assert!(ConanProfiles::new(tmp.path(), None, None).is_err());
    }
}

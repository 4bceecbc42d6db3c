//! Conan package references (`name/version@user/channel`).

use std::fmt;
use std::str::FromStr;

use anyhow::Result;

use crate::core::error::ConfigError;
use crate::core::package_config::PackageConfigProvider;

/// Identifier of a package recipe in a Conan cache or remote.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageReference {
    name: String,
    version: String,
    user_channel: Option<(String, String)>,
}

impl PackageReference {
    /// A reference without user and channel.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        PackageReference {
            name: name.into(),
            version: version.into(),
            user_channel: None,
        }
    }

    /// Set user and channel.
    pub fn with_user_channel(mut self, user: impl Into<String>, channel: impl Into<String>) -> Self {
        self.user_channel = Some((user.into(), channel.into()));
        self
    }

    /// Build a reference for `name`, filling missing parts from package configs.
    ///
    /// The version falls back to the package config. User and channel fall
    /// back to the package config, then to the default user and the channel
    /// from `stable_packages.yml`. Unless both user and channel are given, a
    /// package config must exist.
    pub fn resolve(
        packages: &PackageConfigProvider,
        name: &str,
        version: Option<&str>,
        user: Option<&str>,
        channel: Option<&str>,
    ) -> Result<Self> {
        if name.is_empty() {
            return Err(ConfigError::InvalidReference {
                reference: String::new(),
                reason: "package name is empty".to_string(),
            }
            .into());
        }

        let config = packages.package_config(name)?;

        let version = match (version, config.as_ref().and_then(|c| c.version.as_deref())) {
            (Some(v), _) | (None, Some(v)) => v.to_string(),
            (None, None) if config.is_some() => {
                return Err(ConfigError::MissingVersion {
                    package: name.to_string(),
                }
                .into())
            }
            (None, None) => {
                return Err(ConfigError::MissingPackageConfig {
                    package: name.to_string(),
                }
                .into())
            }
        };

        if let (Some(user), Some(channel)) = (user, channel) {
            return Ok(Self::new(name, version).with_user_channel(user, channel));
        }

        let config = config.ok_or_else(|| ConfigError::MissingPackageConfig {
            package: name.to_string(),
        })?;

        let user = user
            .map(str::to_string)
            .or(config.user)
            .unwrap_or_else(|| packages.default_user().to_string());
        let channel = channel
            .map(str::to_string)
            .or(config.channel)
            .unwrap_or_else(|| packages.channel(name, &version).to_string());

        Ok(Self::new(name, version).with_user_channel(user, channel))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn user(&self) -> Option<&str> {
        self.user_channel.as_ref().map(|(u, _)| u.as_str())
    }

    pub fn channel(&self) -> Option<&str> {
        self.user_channel.as_ref().map(|(_, c)| c.as_str())
    }

    /// `--version/--user/--channel` arguments for Conan commands taking a recipe path.
    pub fn conan_args(&self) -> Vec<String> {
        let mut args = vec!["--version".to_string(), self.version.clone()];
        if let Some((user, channel)) = &self.user_channel {
            args.extend([
                "--user".to_string(),
                user.clone(),
                "--channel".to_string(),
                channel.clone(),
            ]);
        }
        args
    }
}

impl fmt::Display for PackageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)?;
        if let Some((user, channel)) = &self.user_channel {
            write!(f, "@{}/{}", user, channel)?;
        }
        Ok(())
    }
}

impl FromStr for PackageReference {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidReference {
            reference: s.to_string(),
            reason: reason.to_string(),
        };

        let (name_version, user_channel) = match s.split_once('@') {
            Some((nv, uc)) => (nv, Some(uc)),
            None => (s, None),
        };

        let (name, version) = name_version
            .split_once('/')
            .ok_or_else(|| invalid("expected `name/version`"))?;
        if name.is_empty() || version.is_empty() || version.contains('/') {
            return Err(invalid("expected `name/version`"));
        }

        let mut reference = PackageReference::new(name, version);

        if let Some(user_channel) = user_channel {
            let (user, channel) = user_channel
                .split_once('/')
                .ok_or_else(|| invalid("expected `@user/channel`"))?;
            if user.is_empty() || channel.is_empty() || channel.contains(['/', '@']) {
                return Err(invalid("expected `@user/channel`"));
            }
            reference = reference.with_user_channel(user, channel);
        }

        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::Platform;
    use crate::util::context::Directories;
    use std::fs;
    use tempfile::TempDir;

    fn provider(tmp: &TempDir) -> PackageConfigProvider {
        let dirs = Directories::new(tmp.path(), tmp.path().join("out"));
        PackageConfigProvider::new(&dirs, &Platform::Linux).unwrap()
    }

    fn write_config(tmp: &TempDir, name: &str, contents: &str) {
        let dir = tmp.path().join("config/packages");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{}.yml", name)), contents).unwrap();
    }

    #[test]
    fn test_round_trip() {
        for s in ["zlib/1.2.13@audacity/stable", "zlib/1.2.13", "wxwidgets/3.1.3.4-audacity@audacity/testing"] {
            let reference: PackageReference = s.parse().unwrap();
            assert_eq!(reference.to_string(), s);
        }
    }

    #[test]
    fn test_parse_parts() {
        let reference: PackageReference = "expat/2.5.0@audacity/testing".parse().unwrap();
        assert_eq!(reference.name(), "expat");
        assert_eq!(reference.version(), "2.5.0");
        assert_eq!(reference.user(), Some("audacity"));
        assert_eq!(reference.channel(), Some("testing"));

        let bare: PackageReference = "expat/2.5.0".parse().unwrap();
        assert_eq!(bare.user(), None);
        assert_eq!(bare.channel(), None);
    }

    #[test]
    fn test_parse_invalid() {
        for s in ["zlib", "/1.0", "zlib/", "zlib/1.0@", "zlib/1.0@user", "zlib/1.0@/stable", "a/b/c"] {
            assert!(
                matches!(
                    s.parse::<PackageReference>(),
                    Err(ConfigError::InvalidReference { .. })
                ),
                "`{}` should not parse",
                s
            );
        }
    }

    #[test]
    fn test_without_user_channel_omits_suffix() {
        let reference = PackageReference::new("zlib", "1.3");
        assert_eq!(reference.to_string(), "zlib/1.3");
        assert_eq!(reference.conan_args(), vec!["--version", "1.3"]);
    }

    #[test]
    fn test_resolve_without_config_fails() {
        let tmp = TempDir::new().unwrap();
        let packages = provider(&tmp);

        let err = PackageReference::resolve(&packages, "zlib", Some("1.2.13"), None, None)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::MissingPackageConfig { .. })
        ));

        let err = PackageReference::resolve(&packages, "zlib", None, None, None).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_resolve_explicit_user_channel_needs_no_config() {
        let tmp = TempDir::new().unwrap();
        let packages = provider(&tmp);

        let reference = PackageReference::resolve(
            &packages,
            "zlib",
            Some("1.2.13"),
            Some("me"),
            Some("dev"),
        )
        .unwrap();
        assert_eq!(reference.to_string(), "zlib/1.2.13@me/dev");
    }

    #[test]
    fn test_resolve_defaults_from_config() {
        let tmp = TempDir::new().unwrap();
        write_config(&tmp, "zlib", "config:\n  version: 1.3\n");
        write_config(&tmp, "qt", "config:\n  version: 6.5.0\n  user: kde\n  channel: nightly\n");
        fs::write(
            tmp.path().join("config/stable_packages.yml"),
            "packages:\n  zlib: \"*\"\n",
        )
        .unwrap();
        let packages = provider(&tmp);

        let zlib = PackageReference::resolve(&packages, "zlib", None, None, None).unwrap();
        assert_eq!(zlib.to_string(), "zlib/1.3@audacity/stable");

        let qt = PackageReference::resolve(&packages, "qt", None, None, None).unwrap();
        assert_eq!(qt.to_string(), "qt/6.5.0@kde/nightly");

        let qt_custom =
            PackageReference::resolve(&packages, "qt", Some("6.6.0"), Some("me"), None).unwrap();
        assert_eq!(qt_custom.to_string(), "qt/6.6.0@me/nightly");
    }

    #[test]
    fn test_resolve_config_without_version() {
        let tmp = TempDir::new().unwrap();
        write_config(&tmp, "tool", "config:\n  build_tool: true\n");
        let packages = provider(&tmp);

        let err = PackageReference::resolve(&packages, "tool", None, None, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::MissingVersion { .. })
        ));
    }
}

//! Recipe checkout fixtures.
//!
//! Builds the `config/` and `recipes/` layout conan-utils expects, with
//! package configs, recipe stores, profiles and build orders.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::core::platform::Platform;
use crate::util::config::Config;
use crate::util::context::{Directories, GlobalContext};

/// Fixture for a recipes checkout.
#[derive(Debug, Clone, Default)]
pub struct RepoFixture {
    /// Files (path relative to the checkout root -> content).
    pub files: BTreeMap<PathBuf, String>,
}

impl RepoFixture {
    /// A checkout with a `default` profile and nothing else.
    pub fn new() -> Self {
        RepoFixture::default().with_file("config/profiles/default.profile", "[settings]\nos=Linux\n")
    }

    /// Add an arbitrary file.
    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    /// Add `config/packages/<name>.yml` with the given `config:` body lines.
    pub fn with_package_config(self, name: &str, body: &str) -> Self {
        let mut content = String::from("config:\n");
        for line in body.lines().filter(|l| !l.trim().is_empty()) {
            content.push_str("  ");
            content.push_str(line.trim());
            content.push('\n');
        }
        self.with_file(format!("config/packages/{}.yml", name), content)
    }

    /// Add a recipe store with every version in folder `all`, and a package
    /// config whose default version is the first one.
    pub fn with_package(self, name: &str, versions: &[&str]) -> Self {
        let default = versions.first().copied().unwrap_or("1.0");
        self.with_recipe(name, versions)
            .with_package_config(name, &format!("version: \"{}\"", default))
    }

    /// Add `recipes/<name>/config.yml` and `recipes/<name>/all/conanfile.py`.
    pub fn with_recipe(self, name: &str, versions: &[&str]) -> Self {
        let mut config = String::from("versions:\n");
        for version in versions {
            config.push_str(&format!("  \"{}\":\n    folder: all\n", version));
        }
        self.with_file(format!("recipes/{}/config.yml", name), config)
            .with_file(
                format!("recipes/{}/all/conanfile.py", name),
                format!("from conan import ConanFile\n\nclass Recipe(ConanFile):\n    name = \"{}\"\n", name),
            )
    }

    /// Add `config/build_order.yml`.
    pub fn with_build_order(self, yaml: &str) -> Self {
        self.with_file("config/build_order.yml", yaml)
    }

    /// Write all files below `base`.
    pub fn write_to(&self, base: &Path) -> std::io::Result<()> {
        for (path, content) in &self.files {
            let full = base.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(full, content)?;
        }
        Ok(())
    }

    /// Write into a fresh temp dir.
    pub fn create(&self) -> CheckoutDir {
        let tmp = TempDir::new().unwrap();
        self.write_to(tmp.path()).unwrap();
        CheckoutDir { tmp }
    }
}

/// A checkout written to a temp directory.
pub struct CheckoutDir {
    tmp: TempDir,
}

impl CheckoutDir {
    pub fn root(&self) -> &Path {
        self.tmp.path()
    }

    pub fn dirs(&self) -> Directories {
        Directories::new(self.root(), self.root().join(".conan_utils"))
    }

    pub fn context(&self, platform: Platform) -> GlobalContext {
        GlobalContext::new(self.dirs(), platform, Config::default()).unwrap()
    }
}

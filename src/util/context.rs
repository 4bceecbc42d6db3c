//! Global context for conan-utils operations.
//!
//! Holds the directory layout, merged configuration and the package config
//! loader. Built once in `main` and passed by reference to every operation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::package_config::PackageConfigProvider;
use crate::core::platform::Platform;
use crate::util::config::{global_config_path, load_config, Config};

/// Directory layout of a recipes checkout and its output directory.
///
/// The root holds `config/` and `recipes/`. The output directory holds
/// everything conan-utils creates: the Python environment, the Conan home,
/// scratch space and build folders.
#[derive(Debug, Clone)]
pub struct Directories {
    root: PathBuf,
    output: PathBuf,
}

impl Directories {
    pub fn new(root: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Directories {
            root: root.into(),
            output: output.into(),
        }
    }

    /// Layout rooted at `cwd` with output in `<cwd>/.conan_utils`.
    pub fn from_cwd(root: Option<PathBuf>, output: Option<PathBuf>) -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        let root = root.map(|r| cwd.join(r)).unwrap_or_else(|| cwd.clone());
        let output = output
            .map(|o| cwd.join(o))
            .unwrap_or_else(|| cwd.join(".conan_utils"));
        Ok(Self::new(root, output))
    }

    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn recipes_dir(&self) -> PathBuf {
        self.root.join("recipes")
    }

    pub fn config_packages_dir(&self) -> PathBuf {
        self.config_dir().join("packages")
    }

    /// Platform-specific package config overrides.
    pub fn config_platform_packages_dir(&self, platform: &Platform) -> PathBuf {
        self.config_packages_dir().join(platform.as_str())
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.config_dir().join("profiles")
    }

    pub fn stable_packages_path(&self) -> PathBuf {
        self.config_dir().join("stable_packages.yml")
    }

    pub fn default_build_order_path(&self) -> PathBuf {
        self.config_dir().join("build_order.yml")
    }

    pub fn output_dir(&self) -> &Path {
        &self.output
    }

    /// Python virtual environment holding Conan.
    pub fn env_dir(&self) -> PathBuf {
        self.output.join("venv")
    }

    /// Managed Conan home.
    pub fn conan_home_dir(&self) -> PathBuf {
        self.output.join("conan")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.output.join("temp")
    }

    /// Output folder for `conan build`.
    pub fn build_dir(&self) -> PathBuf {
        self.output.join("build")
    }

    pub fn install_dir(&self) -> PathBuf {
        self.output.join("install")
    }

    pub fn pycache_dir(&self) -> PathBuf {
        self.temp_dir().join("pycache")
    }

    /// Harvested debug data, one subdirectory per processor.
    pub fn debug_processors_dir(&self) -> PathBuf {
        self.temp_dir().join("debug_processors")
    }

    /// Scratch space for downloaded cache bundles.
    pub fn remote_cache_dir(&self) -> PathBuf {
        self.temp_dir().join("remote_cache")
    }

    /// Project configuration file.
    pub fn project_config_path(&self) -> PathBuf {
        self.output.join("config.toml")
    }
}

/// Global context containing configuration and paths.
#[derive(Debug)]
pub struct GlobalContext {
    dirs: Directories,
    platform: Platform,
    config: Config,
    packages: PackageConfigProvider,
    verbose: bool,
}

impl GlobalContext {
    /// Create a context from explicit parts.
    pub fn new(dirs: Directories, platform: Platform, config: Config) -> Result<Self> {
        let packages = PackageConfigProvider::new(&dirs, &platform)?;
        Ok(GlobalContext {
            dirs,
            platform,
            config,
            packages,
            verbose: false,
        })
    }

    /// Create a context for the running host, reading config files and the environment.
    pub fn load(root: Option<PathBuf>, output: Option<PathBuf>) -> Result<Self> {
        let dirs = Directories::from_cwd(root, output)?;

        let global = global_config_path();
        let mut config = load_config(global.as_deref(), &dirs.project_config_path());
        config.apply_env(|key| std::env::var(key).ok());

        Self::new(dirs, Platform::current(), config)
    }

    /// Set verbose mode.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Override the platform used for build orders and package configs.
    pub fn with_platform(mut self, platform: Platform) -> Result<Self> {
        self.packages = PackageConfigProvider::new(&self.dirs, &platform)?;
        self.platform = platform;
        Ok(self)
    }

    pub fn dirs(&self) -> &Directories {
        &self.dirs
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn packages(&self) -> &PackageConfigProvider {
        &self.packages
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

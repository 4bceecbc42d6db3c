//! Scoped Conan environment and environment bootstrap.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::conan::{python_executable, Conan};
use crate::util::context::Directories;
use crate::util::fs::{ensure_dir, remove_tree};
use crate::util::process::ProcessBuilder;

/// Points Conan at the managed virtual environment and home while alive.
///
/// Sets `VIRTUAL_ENV` (if the environment exists), `CONAN_HOME` (if the
/// home exists or is given explicitly) and `PYTHONPYCACHEPREFIX`. Previous
/// values are restored on drop, so guards may nest.
#[derive(Debug)]
#[must_use = "the environment is restored when the guard is dropped"]
pub struct ConanEnv {
    saved: Vec<(&'static str, Option<OsString>)>,
}

impl ConanEnv {
    /// Use the managed environment and home when they exist.
    pub fn enter(dirs: &Directories) -> Self {
        Self::enter_with(dirs, None)
    }

    /// Use the managed environment with an explicit Conan home.
    pub fn enter_with_home(dirs: &Directories, home: &Path) -> Self {
        Self::enter_with(dirs, Some(home.to_path_buf()))
    }

    fn enter_with(dirs: &Directories, home: Option<PathBuf>) -> Self {
        let mut guard = ConanEnv { saved: Vec::new() };

        let env_dir = dirs.env_dir();
        if env_dir.is_dir() {
            guard.set("VIRTUAL_ENV", env_dir.as_os_str());
        }

        let home = home.or_else(|| Some(dirs.conan_home_dir()).filter(|h| h.is_dir()));
        if let Some(home) = home {
            guard.set("CONAN_HOME", home.as_os_str());
        }

        guard.set("PYTHONPYCACHEPREFIX", dirs.pycache_dir().as_os_str());
        guard
    }

    fn set(&mut self, key: &'static str, value: &std::ffi::OsStr) {
        self.saved.push((key, std::env::var_os(key)));
        tracing::debug!("{}={}", key, value.to_string_lossy());
        std::env::set_var(key, value);
    }
}

impl Drop for ConanEnv {
    fn drop(&mut self) {
        for (key, previous) in self.saved.drain(..).rev() {
            match previous {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
        }
    }
}

/// Create the managed Python environment and install Conan into it.
///
/// Fails if the environment exists, unless `clean` removes it (and the
/// managed Conan home) first.
pub fn create_conan_environment(dirs: &Directories, clean: bool) -> Result<()> {
    let env_dir = dirs.env_dir();
    let home_dir = dirs.conan_home_dir();

    if env_dir.exists() {
        if !clean {
            bail!(
                "Conan environment already exists at {} (use --clean to recreate it)",
                env_dir.display()
            );
        }
        eprintln!("{:>12} Conan environment at {}", "Removing", env_dir.display());
        remove_tree(&env_dir)?;
    }

    if clean && home_dir.exists() {
        eprintln!("{:>12} Conan home at {}", "Removing", home_dir.display());
        remove_tree(&home_dir)?;
    }

    ensure_dir(&home_dir)?;

    eprintln!(
        "{:>12} Conan environment at {}, home at {}",
        "Creating",
        env_dir.display(),
        home_dir.display()
    );

    let python = ["python3", "python"]
        .into_iter()
        .find_map(crate::util::process::find_executable)
        .ok_or_else(|| anyhow::anyhow!("no Python interpreter found on PATH"))?;

    ProcessBuilder::new(python)
        .args(["-m", "venv"])
        .arg(&env_dir)
        .run()?;

    let _env = ConanEnv::enter(dirs);
    ProcessBuilder::new(python_executable(&env_dir))
        .args(["-m", "pip", "install", "conan"])
        .run()
}

/// Path of the Conan executable used under the managed environment.
pub fn conan_path(dirs: &Directories) -> PathBuf {
    let _env = ConanEnv::enter(dirs);
    Conan::from_env().program().to_path_buf()
}

/// Conan home used under the managed environment.
pub fn conan_home_path(dirs: &Directories) -> PathBuf {
    let _env = ConanEnv::enter(dirs);
    match std::env::var_os("CONAN_HOME") {
        Some(home) => PathBuf::from(home),
        None => directories::BaseDirs::new()
            .map(|b| b.home_dir().join(".conan2"))
            .unwrap_or_else(|| PathBuf::from(".conan2")),
    }
}

/// Conan version under the managed environment.
pub fn conan_version(dirs: &Directories) -> Result<String> {
    let _env = ConanEnv::enter(dirs);
    Conan::from_env().version()
}

//! Conan command line integration.
//!
//! Every interaction with Conan goes through its CLI. [`Conan`] locates the
//! executable and builds commands; the submodules compute the arguments for
//! recipe, cache and remote operations.

pub mod cache;
pub mod env;
pub mod index;
pub mod recipe;
pub mod recipe_store;
pub mod remotes;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::util::process::ProcessBuilder;

pub use env::ConanEnv;
pub use recipe::ConanRecipe;
pub use recipe_store::RecipeStore;

/// Runs the `conan` executable.
#[derive(Debug, Clone)]
pub struct Conan {
    program: PathBuf,
}

impl Conan {
    /// Locate Conan through `VIRTUAL_ENV`, falling back to `PATH`.
    ///
    /// Call after entering a [`ConanEnv`] so the managed environment is used.
    pub fn from_env() -> Self {
        let virtual_env = std::env::var_os("VIRTUAL_ENV").map(PathBuf::from);
        Conan {
            program: conan_executable(virtual_env.as_deref()),
        }
    }

    /// Use a specific executable.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Conan {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// A `conan` command with the given arguments.
    pub fn command<I, S>(&self, args: I) -> ProcessBuilder
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        ProcessBuilder::new(&self.program).args(args)
    }

    /// Run with output streamed to the terminal; fail on non-zero exit.
    pub fn run<I, S>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let cmd = self.command(args);
        tracing::info!("running `{}`", cmd.display_command());
        cmd.run()
    }

    /// Run and return trimmed stdout; fail on non-zero exit.
    pub fn output<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.command(args).stdout_string()
    }

    /// Conan version, the last word of `conan --version`.
    pub fn version(&self) -> Result<String> {
        let output = self
            .output(["--version"])
            .context("failed to query Conan version")?;
        Ok(output
            .split_whitespace()
            .last()
            .unwrap_or_default()
            .to_string())
    }
}

/// Path of the Conan executable for an optional virtual environment.
pub fn conan_executable(virtual_env: Option<&Path>) -> PathBuf {
    match virtual_env {
        Some(env) if cfg!(windows) => env.join("Scripts").join("conan.exe"),
        Some(env) => env.join("bin").join("conan"),
        None => crate::util::process::find_executable("conan")
            .unwrap_or_else(|| PathBuf::from(if cfg!(windows) { "conan.exe" } else { "conan" })),
    }
}

/// Path of the Python interpreter inside a virtual environment.
pub fn python_executable(virtual_env: &Path) -> PathBuf {
    if cfg!(windows) {
        virtual_env.join("Scripts").join("python.exe")
    } else {
        virtual_env.join("bin").join("python")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(windows))]
    #[test]
    fn test_conan_executable_in_venv() {
        assert_eq!(
            conan_executable(Some(Path::new("/work/.conan_utils/venv"))),
            PathBuf::from("/work/.conan_utils/venv/bin/conan")
        );
        assert_eq!(
            python_executable(Path::new("/venv")),
            PathBuf::from("/venv/bin/python")
        );
    }

    #[test]
    fn test_conan_executable_without_venv() {
        let path = conan_executable(None);
        assert!(path.to_string_lossy().contains("conan"));
    }

    #[cfg(unix)]
    #[test]
    fn test_version_is_last_word() {
        let tmp = tempfile::TempDir::new().unwrap();
        let fake = crate::test_support::FakeConan::install(tmp.path());
        assert_eq!(fake.conan().version().unwrap(), "2.0.17");
    }
}

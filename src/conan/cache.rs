//! Conan cache folders and cleanup.
//!
//! Conan only knows about folders inside its cache. Recipes built in local
//! mode also leave sources and build trees next to the recipe and in the
//! output directory, so cleanup removes those explicitly.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::conan::recipe::ConanRecipe;
use crate::conan::Conan;
use crate::util::fs::{glob_dirs, remove_tree};

/// Folder kinds reported by `conan cache path`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheFolder {
    Export,
    ExportSource,
    Source,
    Build,
}

impl CacheFolder {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheFolder::Export => "export",
            CacheFolder::ExportSource => "export_source",
            CacheFolder::Source => "source",
            CacheFolder::Build => "build",
        }
    }
}

/// Ask Conan where it keeps `folder` for `reference`.
///
/// `reference` may carry a package id (`name/version@user/channel:id`).
pub fn cache_path(conan: &Conan, reference: &str, folder: CacheFolder) -> Result<PathBuf> {
    let mut args = vec!["cache", "path", reference];
    if folder != CacheFolder::Export {
        args.extend(["--folder", folder.as_str()]);
    }
    let output = conan
        .output(args)
        .with_context(|| format!("failed to query {} folder of `{}`", folder.as_str(), reference))?;
    Ok(PathBuf::from(output.trim()))
}

/// Source folder of a recipe.
///
/// Conan's source folder when it exists, otherwise the recipe's local `src/`.
pub fn source_folder(conan: &Conan, recipe: &ConanRecipe) -> Result<PathBuf> {
    let path = cache_path(conan, &recipe.reference().to_string(), CacheFolder::Source)?;
    if path.is_dir() {
        Ok(path)
    } else {
        Ok(recipe.local_source_dir())
    }
}

/// What [`clean_cache`] removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanOptions {
    pub sources: bool,
    pub builds: bool,
    pub downloads: bool,
    pub temp: bool,
    /// Everything; the other flags are ignored.
    pub all: bool,
}

impl Default for CleanOptions {
    fn default() -> Self {
        CleanOptions {
            sources: false,
            builds: true,
            downloads: true,
            temp: true,
            all: false,
        }
    }
}

impl CleanOptions {
    pub fn with_sources(mut self, sources: bool) -> Self {
        self.sources = sources;
        self
    }

    fn removes_sources(&self) -> bool {
        self.all || self.sources
    }

    fn removes_builds(&self) -> bool {
        self.all || self.builds
    }
}

/// Arguments of `conan cache clean` for a reference.
pub fn clean_cache_args(reference: &str, options: &CleanOptions) -> Vec<String> {
    let mut args = vec!["cache".to_string(), "clean".to_string(), reference.to_string()];
    if !options.all {
        let flags = [
            (options.sources, "--source"),
            (options.builds, "--build"),
            (options.downloads, "--download"),
            (options.temp, "--temp"),
        ];
        args.extend(
            flags
                .into_iter()
                .filter(|(enabled, _)| *enabled)
                .map(|(_, flag)| flag.to_string()),
        );
    }
    args
}

/// Clean Conan's cache for a recipe, then the folders Conan does not track.
///
/// Returns the number of directories removed. Running it again on clean
/// folders removes nothing.
pub fn clean_cache(conan: &Conan, recipe: &ConanRecipe, options: &CleanOptions) -> Result<usize> {
    let reference = recipe.reference().to_string();
    tracing::info!("cleaning cache for `{}`", reference);

    conan
        .run(clean_cache_args(&reference, options))
        .with_context(|| format!("failed to clean cache for `{}`", reference))?;

    let mut removed = 0;

    if options.removes_sources() {
        let sources = source_folder(conan, recipe)?;
        removed += remove_counted(sources)?;
    }

    if options.removes_builds() {
        for dir in recipe.local_build_dirs() {
            removed += remove_counted(dir)?;
        }
    }

    for test_dir in recipe.test_package_dirs() {
        if !test_dir.is_dir() {
            continue;
        }
        for dir in glob_dirs(&test_dir, "build*")? {
            removed += remove_counted(dir)?;
        }
    }

    Ok(removed)
}

fn remove_counted(dir: PathBuf) -> Result<usize> {
    if remove_tree(&dir)? {
        tracing::debug!("removed {}", dir.display());
        Ok(1)
    } else {
        Ok(0)
    }
}

/// Clean the whole cache and remove every package from it.
pub fn clean_all(conan: &Conan) -> Result<()> {
    conan
        .run(["cache", "clean", "*"])
        .context("failed to clean Conan cache")?;
    conan
        .run(["remove", "--confirm", "*"])
        .context("failed to remove packages from Conan cache")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_cache_args() {
        let args = clean_cache_args("zlib/1.3@audacity/stable", &CleanOptions::default());
        assert_eq!(
            args.join(" "),
            "cache clean zlib/1.3@audacity/stable --build --download --temp"
        );

        let args = clean_cache_args(
            "zlib/1.3",
            &CleanOptions {
                all: true,
                ..Default::default()
            },
        );
        assert_eq!(args.join(" "), "cache clean zlib/1.3");

        let args = clean_cache_args("zlib/1.3", &CleanOptions::default().with_sources(true));
        assert!(args.contains(&"--source".to_string()));
    }

    #[test]
    fn test_cache_folder_names() {
        assert_eq!(CacheFolder::ExportSource.as_str(), "export_source");
        assert_eq!(CacheFolder::Build.as_str(), "build");
    }
}

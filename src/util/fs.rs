//! Filesystem utilities.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::glob;
use walkdir::WalkDir;

use crate::util::retry::RetryPolicy;

/// Remove a directory tree, retrying while the OS keeps files locked.
///
/// Returns `Ok(false)` when `path` is not a directory (nothing to do).
pub fn remove_tree(path: &Path) -> Result<bool> {
    remove_tree_with(path, &RetryPolicy::tree_removal())
}

/// Remove a directory tree using the given retry policy.
///
/// A permission error makes the tree writable and tries again within the
/// same attempt before falling back to the policy.
pub fn remove_tree_with(path: &Path, policy: &RetryPolicy) -> Result<bool> {
    if !path.is_dir() {
        return Ok(false);
    }

    policy.run(&format!("removing `{}`", path.display()), |_| {
        match fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                tracing::warn!(
                    "failed to remove `{}`, changing permissions and retrying",
                    path.display()
                );
                make_writable(path)?;
                fs::remove_dir_all(path)
                    .with_context(|| format!("failed to remove directory: {}", path.display()))
            }
            Err(e) => {
                Err(e).with_context(|| format!("failed to remove directory: {}", path.display()))
            }
        }
    })?;

    Ok(true)
}

/// Remove a file if it exists.
pub fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove file: {}", path.display())),
    }
}

/// Give the owner write access to every entry below `path`.
fn make_writable(path: &Path) -> Result<()> {
    for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
        if entry.path_is_symlink() {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue,
        };
        let mut perms = metadata.permissions();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let extra = if metadata.is_dir() { 0o700 } else { 0o600 };
            perms.set_mode(perms.mode() | extra);
        }

        #[cfg(not(unix))]
        {
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(false);
        }

        fs::set_permissions(entry.path(), perms)
            .with_context(|| format!("failed to change permissions: {}", entry.path().display()))?;
    }
    Ok(())
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Read a file to string, with nice error messages.
pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read file: {}", path.display()))
}

/// Write a string to a file, creating parent directories if needed.
pub fn write_string(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("failed to write file: {}", path.display()))
}

/// Find directories matching a glob pattern relative to `base`.
pub fn glob_dirs(base: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full_pattern = base.join(pattern);
    let pattern_str = full_pattern.to_string_lossy();

    let mut results = Vec::new();
    for entry in glob(&pattern_str).with_context(|| format!("invalid glob pattern: {}", pattern))? {
        match entry {
            Ok(path) if path.is_dir() => results.push(path),
            Ok(_) => {}
            Err(e) => tracing::warn!("glob error: {}", e),
        }
    }

    results.sort();
    Ok(results)
}

/// Relative path of `path` below `base`, using `/` as separator.
pub fn relative_slash_path(base: &Path, path: &Path) -> String {
    let relative = pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf());
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// List the immediate subdirectory names of `dir`, sorted.
pub fn subdirectory_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

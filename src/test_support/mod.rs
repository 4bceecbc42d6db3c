//! Test utilities for conan-utils unit tests.
//!
//! [`FakeConan`] is a shell script standing in for the Conan CLI: it records
//! every invocation and replays canned responses, so recipe, cache and
//! upload logic can be tested without Conan installed.
//!
//! # Example
//!
//! ```rust,ignore
//! let fake = FakeConan::install(tmp.path());
//! fake.respond("install.json", r#"{"graph": {"nodes": {}}}"#);
//! fake.fail_next("install");
//!
//! // Use fake.conan() in tests...
//! assert_eq!(fake.calls()[0], "install ...");
//! ```

pub mod fixtures;

use std::path::{Path, PathBuf};

use crate::conan::Conan;

pub use fixtures::*;

/// A scripted stand-in for the `conan` executable (Unix only).
#[derive(Debug, Clone)]
pub struct FakeConan {
    root: PathBuf,
    program: PathBuf,
}

impl FakeConan {
    /// Write the fake executable below `dir`.
    ///
    /// Behaviour:
    /// - every call appends its arguments to `calls.log`
    /// - `fail/<command>` makes the next call of `<command>` exit 1
    /// - `--version` prints `Conan version 2.0.17`
    /// - `cache path ... --folder F` prints `<root>/cache/F` (`export` by default)
    /// - `install` prints `responses/install.json` when present
    /// - `remote list` prints `responses/remotes.json`, or `[]`
    /// - `upload` copies `$CONAN_HOME/p/cache.sqlite3` to `upload-index.sqlite3`
    #[cfg(unix)]
    pub fn install(dir: &Path) -> Self {
        use std::os::unix::fs::PermissionsExt;

        let root = dir.join("fake-conan");
        std::fs::create_dir_all(root.join("fail")).unwrap();
        std::fs::create_dir_all(root.join("responses")).unwrap();
        std::fs::create_dir_all(root.join("cache")).unwrap();

        let script = format!(
            r#"#!/bin/sh
root='{root}'
echo "$*" >> "$root/calls.log"
if [ -f "$root/fail/$1" ]; then
  rm -f "$root/fail/$1"
  echo "fake conan: $1 failed" >&2
  exit 1
fi
case "$1" in
  --version)
    echo "Conan version 2.0.17"
    ;;
  cache)
    if [ "$2" = "path" ]; then
      folder=export
      prev=""
      for a in "$@"; do
        case "$a" in --folder=*) folder="${{a#--folder=}}" ;; esac
        if [ "$prev" = "--folder" ]; then folder="$a"; fi
        prev="$a"
      done
      echo "$root/cache/$folder"
    fi
    ;;
  install)
    if [ -f "$root/responses/install.json" ]; then cat "$root/responses/install.json"; fi
    ;;
  upload)
    if [ -f "$CONAN_HOME/p/cache.sqlite3" ]; then cp "$CONAN_HOME/p/cache.sqlite3" "$root/upload-index.sqlite3"; fi
    ;;
  remote)
    if [ "$2" = "list" ]; then
      if [ -f "$root/responses/remotes.json" ]; then cat "$root/responses/remotes.json"; else echo "[]"; fi
    fi
    ;;
esac
exit 0
"#,
            root = root.display()
        );

        let program = root.join("conan");
        std::fs::write(&program, script).unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        FakeConan { root, program }
    }

    /// A [`Conan`] runner using the fake executable.
    pub fn conan(&self) -> Conan {
        Conan::with_program(&self.program)
    }

    /// Recorded invocations, one argument string per call.
    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.root.join("calls.log"))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Calls whose arguments start with `prefix`.
    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    /// Set a canned response file.
    pub fn respond(&self, name: &str, contents: &str) {
        std::fs::write(self.root.join("responses").join(name), contents).unwrap();
    }

    /// Make the next call of `command` fail.
    pub fn fail_next(&self, command: &str) {
        std::fs::write(self.root.join("fail").join(command), "").unwrap();
    }

    /// Package index of the Conan home seen by the last `upload`.
    pub fn upload_index(&self) -> PathBuf {
        self.root.join("upload-index.sqlite3")
    }

    /// Directory reported for `conan cache path --folder <folder>`.
    pub fn cache_folder(&self, folder: &str) -> PathBuf {
        self.root.join("cache").join(folder)
    }
}

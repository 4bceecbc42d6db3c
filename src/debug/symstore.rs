//! Windows symbol store kept in an artifact repository.
//!
//! Files are laid out the way `symstore.exe` does it:
//! `<file>/<key>/<file>`, with transactions recorded under `000Admin/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use walkdir::WalkDir;

use crate::core::platform::Platform;
use crate::debug::harvest::{find_pdb, is_compiler_pdb, pe_images};
use crate::debug::{BuiltPackage, DebugProcessor};
use crate::remote::artifactory::{ArtifactoryClient, Credentials};
use crate::util::config::Config;
use crate::util::fs::{ensure_dir, relative_slash_path, remove_tree, write_string};

const ADMIN_DIR: &str = "000Admin";
const ADMIN_FILES: [&str; 3] = ["lastid.txt", "history.txt", "server.txt"];

/// Symbol server location and key.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SymstoreSettings {
    pub url: Option<String>,
    pub key: Option<String>,
}

impl std::fmt::Debug for SymstoreSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymstoreSettings")
            .field("url", &self.url)
            .field("key", &self.key.as_ref().map(|_| ".."))
            .finish()
    }
}

impl SymstoreSettings {
    /// URL from configuration; key from `ARTIFACTORY_SYMBOLS_KEY`, then `ARTIFACTORY_API_KEY`.
    pub fn from_config<F>(config: &Config, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = ["ARTIFACTORY_SYMBOLS_KEY", "ARTIFACTORY_API_KEY"]
            .into_iter()
            .find_map(|name| lookup(name).filter(|k| !k.is_empty()));
        SymstoreSettings {
            url: config.artifactory.symbols_url.clone(),
            key,
        }
    }
}

/// A file to add to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    pub source: PathBuf,
    pub file_name: String,
    pub key: String,
}

impl StoreEntry {
    /// Path relative to the store root.
    pub fn store_path(&self) -> String {
        format!("{}/{}/{}", self.file_name, self.key, self.file_name)
    }
}

/// PE images of `build_dir` and the PDBs they reference.
pub fn collect_entries(build_dir: &Path) -> Result<Vec<StoreEntry>> {
    let mut entries = Vec::new();
    for (image, info) in pe_images(build_dir)? {
        let Some(file_name) = image.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        entries.push(StoreEntry {
            source: image.clone(),
            file_name,
            key: info.key(),
        });

        let Some(codeview) = info.codeview else {
            continue;
        };
        if is_compiler_pdb(&codeview.pdb_name) {
            continue;
        }
        match find_pdb(build_dir, &codeview.pdb_name) {
            Some(pdb) => entries.push(StoreEntry {
                source: pdb,
                file_name: codeview.pdb_name.clone(),
                key: codeview.key(),
            }),
            None => tracing::debug!("{} not found for {}", codeview.pdb_name, image.display()),
        }
    }
    Ok(entries)
}

/// A symbol store directory.
#[derive(Debug, Clone)]
pub struct SymbolStore {
    root: PathBuf,
}

impl SymbolStore {
    pub fn open(root: &Path) -> Result<Self> {
        ensure_dir(&root.join(ADMIN_DIR))?;
        Ok(SymbolStore {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn admin(&self, file: &str) -> PathBuf {
        self.root.join(ADMIN_DIR).join(file)
    }

    /// Id of the last committed transaction, 0 for an empty store.
    pub fn last_id(&self) -> Result<u32> {
        let path = self.admin("lastid.txt");
        if !path.is_file() {
            return Ok(0);
        }
        let contents = crate::util::fs::read_to_string(&path)?;
        contents
            .trim()
            .parse()
            .with_context(|| format!("invalid transaction id in {}", path.display()))
    }

    /// Copy new entries into the store and record a transaction.
    ///
    /// Entries already present are skipped. Returns the transaction id, or
    /// `None` when nothing was added.
    pub fn add_transaction(
        &self,
        product: &str,
        version: &str,
        entries: &[StoreEntry],
        now: NaiveDateTime,
    ) -> Result<Option<u32>> {
        let mut added = Vec::new();
        for entry in entries {
            let target = self.root.join(entry.store_path());
            if target.exists() {
                continue;
            }
            if let Some(parent) = target.parent() {
                ensure_dir(parent)?;
            }
            fs::copy(&entry.source, &target).with_context(|| {
                format!("failed to store {}", entry.source.display())
            })?;
            added.push(entry);
        }

        if added.is_empty() {
            return Ok(None);
        }

        let id = self.last_id()? + 1;
        let id_str = format!("{:010}", id);

        let transaction: String = added
            .iter()
            .map(|e| {
                format!(
                    "\"{}\\{}\",\"{}\"\r\n",
                    e.file_name,
                    e.key,
                    e.source.display()
                )
            })
            .collect();
        write_string(&self.admin(&id_str), &transaction)?;

        let record = format!(
            "{},add,file,{},{},\"{}\",\"{}\",\"\",\r\n",
            id_str,
            now.format("%m/%d/%Y"),
            now.format("%H:%M:%S"),
            product,
            version
        );
        for file in ["history.txt", "server.txt"] {
            let path = self.admin(file);
            let mut contents = if path.is_file() {
                crate::util::fs::read_to_string(&path)?
            } else {
                String::new()
            };
            contents.push_str(&record);
            write_string(&path, &contents)?;
        }
        write_string(&self.admin("lastid.txt"), &id_str)?;

        tracing::info!("symbol store transaction {} ({} files)", id_str, added.len());
        Ok(Some(id))
    }

    /// Every file of the store, relative with `/`; admin files last.
    pub fn files(&self) -> Vec<(String, PathBuf)> {
        let mut files: Vec<(String, PathBuf)> = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| (relative_slash_path(&self.root, e.path()), e.into_path()))
            .collect();
        files.sort_by_key(|(rel, _)| (rel.starts_with(ADMIN_DIR), rel.clone()));
        files
    }
}

#[derive(Debug)]
pub struct SymstoreProcessor {
    settings: SymstoreSettings,
    platform: Platform,
    dir: PathBuf,
    skip_upload: bool,
    client: Option<ArtifactoryClient>,
    store: Option<SymbolStore>,
}

impl SymstoreProcessor {
    pub fn new(settings: SymstoreSettings, platform: Platform, dir: PathBuf, skip_upload: bool) -> Self {
        SymstoreProcessor {
            settings,
            platform,
            dir,
            skip_upload,
            client: None,
            store: None,
        }
    }

    /// Fetch the server's admin files and merge them with any already in the store.
    ///
    /// A file the server does not have leaves the local copy untouched.
    fn download_admin_files(&self, client: &ArtifactoryClient) -> Result<()> {
        let admin = self.dir.join(ADMIN_DIR);
        for file in ADMIN_FILES {
            let remote = format!("{}/{}", ADMIN_DIR, file);
            let local = admin.join(file);
            let fetched = admin.join(format!("{}.remote", file));

            let server = client
                .get_file(&remote, &fetched)
                .and_then(|_| crate::util::fs::read_to_string(&fetched));
            if fetched.exists() {
                fs::remove_file(&fetched)
                    .with_context(|| format!("failed to remove {}", fetched.display()))?;
            }
            let server = match server {
                Ok(server) => server,
                Err(e) => {
                    tracing::debug!("no {} on symbol server: {:#}", remote, e);
                    continue;
                }
            };

            let merged = if local.is_file() {
                let ours = crate::util::fs::read_to_string(&local)?;
                merge_admin_file(file, &server, &ours)
                    .with_context(|| format!("failed to merge {}", local.display()))?
            } else {
                server
            };
            write_string(&local, &merged)?;
        }
        Ok(())
    }
}

/// Combine the server's copy of an admin file with the local one.
///
/// `lastid.txt` keeps the larger id; the logs keep the server's records
/// followed by local records the server does not have.
fn merge_admin_file(file: &str, server: &str, local: &str) -> Result<String> {
    if file == "lastid.txt" {
        let parse = |s: &str| -> Result<u32> {
            let s = s.trim();
            if s.is_empty() {
                return Ok(0);
            }
            s.parse()
                .with_context(|| format!("invalid transaction id `{}`", s))
        };
        let id = parse(server)?.max(parse(local)?);
        return Ok(format!("{:010}", id));
    }

    let known: Vec<&str> = server.lines().map(|l| l.trim_end_matches('\r')).collect();
    let mut merged = server.to_string();
    if !merged.is_empty() && !merged.ends_with('\n') {
        merged.push_str("\r\n");
    }
    for line in local.split_inclusive('\n') {
        let record = line.trim_end_matches(['\r', '\n']);
        if record.is_empty() || known.contains(&record) {
            continue;
        }
        merged.push_str(line);
        if !line.ends_with('\n') {
            merged.push_str("\r\n");
        }
    }
    Ok(merged)
}

impl DebugProcessor for SymstoreProcessor {
    fn name(&self) -> &'static str {
        "symstore"
    }

    fn activate(&mut self, directory: Option<&Path>) -> Result<bool> {
        if directory.is_none() && !self.platform.is_windows() {
            return Ok(false);
        }
        let Some(url) = self.settings.url.clone().filter(|u| !u.is_empty()) else {
            tracing::info!("ARTIFACTORY_SYMBOLS_URL is not set, symbol store disabled");
            return Ok(false);
        };
        let Some(key) = self.settings.key.clone() else {
            tracing::info!("ARTIFACTORY_SYMBOLS_KEY or ARTIFACTORY_API_KEY is not set, symbol store disabled");
            return Ok(false);
        };

        if let Some(directory) = directory {
            self.dir = directory.to_path_buf();
        }
        let store = SymbolStore::open(&self.dir)?;
        let client = ArtifactoryClient::new(&url, Credentials::Bearer(key))?;
        self.download_admin_files(&client)?;

        self.client = Some(client);
        self.store = Some(store);
        Ok(true)
    }

    fn process(&mut self, package: &BuiltPackage<'_>) -> Result<()> {
        if package.is_build_tool {
            tracing::info!("skipping symbol store for build tool {}", package.reference);
            return Ok(());
        }
        let Some(store) = &self.store else {
            return Ok(());
        };

        let entries = collect_entries(package.build_dir)?;
        store.add_transaction(
            package.reference.name(),
            package.reference.version(),
            &entries,
            Local::now().naive_local(),
        )?;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        let (Some(client), Some(store)) = (self.client.take(), self.store.take()) else {
            return Ok(());
        };

        if self.skip_upload {
            tracing::info!("keeping symbol store in {}", self.dir.display());
            return Ok(());
        }

        for (relative, path) in store.files() {
            if let Err(e) = client.upload_file(&path, &relative) {
                tracing::warn!("failed to upload {} to symbol server: {:#}", relative, e);
            }
        }

        remove_tree(&self.dir)?;
        Ok(())
    }

    fn discard(&mut self) -> Result<()> {
        self.client = None;
        self.store = None;
        remove_tree(&self.dir)?;
        Ok(())
    }
}

//! Conan caches shared through an artifact store.
//!
//! A build machine bundles its Conan home (and harvested debug symbols) with
//! [`store_cache`]. A publishing machine later replays every bundle of a
//! group with [`process_conan_cache`]: the recipes and binaries are uploaded
//! to the Conan remotes and the debug symbols to their stores.
//!
//! Blob layout in the cache repository:
//!
//! ```text
//! <group>/conan/<platform>/<cache id>.tar.xz   conan/ + metadata.yml
//! <group>/debug/<platform>/<cache id>.tar.xz   debug_processors/
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::conan::index::fix_windows_paths;
use crate::conan::{Conan, ConanEnv};
use crate::core::build_order::load_build_order;
use crate::core::error::ConfigError;
use crate::core::platform::Platform;
use crate::debug::{DebugProcessors, ProcessorKind, ProcessorSettings};
use crate::ops::build::finish_with_cleanup;
use crate::ops::upload::{upload_all, UploadOptions};
use crate::remote::{ArtifactoryClient, Credentials};
use crate::util::archive::{archive_stem, pack, unpack, ArchiveEntry, Compression};
use crate::util::config::Config;
use crate::util::context::GlobalContext;
use crate::util::fs::{ensure_dir, remove_file_if_exists, remove_tree, subdirectory_names};

const METADATA_FILE: &str = "metadata.yml";
const CONAN_DIR: &str = "conan";
const DEBUG_DIR: &str = "debug_processors";

/// Where the cache repository is and how to log in.
#[derive(Debug, Clone, Default)]
pub struct CacheRemote {
    /// Repository URL; `artifactory.cache_url` when unset.
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub key: Option<String>,
}

impl CacheRemote {
    pub fn client(&self, config: &Config) -> Result<ArtifactoryClient> {
        let url = self
            .url
            .as_deref()
            .or(config.artifactory.cache_url.as_deref())
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::MissingSetting {
                setting: "cache repository URL",
                hint: "pass --remote or set ARTIFACTORY_CACHE_URL",
            })?;
        let credentials = Credentials::resolve(
            self.username.clone(),
            self.password.clone(),
            self.key.clone(),
            |name| std::env::var(name).ok(),
        )?;
        ArtifactoryClient::new(url, credentials)
    }
}

/// `metadata.yml` stored in a bundle by the build machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheMetadata {
    pub upload_build_tools: bool,
    /// Build order name or path, relative to `config/`.
    pub build_order: Option<String>,
    pub platform: Option<String>,
}

impl CacheMetadata {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if contents.trim().is_empty() {
            return Ok(CacheMetadata::default());
        }
        serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))
    }
}

/// The two blobs a bundle is split into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobKind {
    Conan,
    Debug,
}

impl BlobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobKind::Conan => "conan",
            BlobKind::Debug => "debug",
        }
    }
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `<cache id>.tar[.ext]`
pub fn cache_file_name(cache_id: &str, compression: Compression) -> String {
    compression.file_name(cache_id)
}

/// Repository path of a blob.
pub fn blob_path(group_id: &str, kind: BlobKind, platform: &Platform, file_name: &str) -> String {
    format!("{}/{}/{}/{}", group_id, kind, platform, file_name)
}

/// A blob found in the cache repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheBlob {
    /// Path as listed by the repository.
    pub path: String,
    pub kind: BlobKind,
    pub platform: Platform,
    pub file_name: String,
}

impl CacheBlob {
    /// Parse a listed path of `group_id`; other paths give `None`.
    pub fn parse(group_id: &str, path: &str) -> Option<CacheBlob> {
        let relative = path
            .trim_start_matches('/')
            .strip_prefix(group_id.trim_matches('/'))?
            .strip_prefix('/')?;

        let mut parts = relative.split('/');
        let kind = match parts.next()? {
            "conan" => BlobKind::Conan,
            "debug" => BlobKind::Debug,
            _ => return None,
        };
        let platform = parts.next()?.parse().ok()?;
        let file_name = parts.next()?.to_string();
        if parts.next().is_some() || file_name.is_empty() {
            return None;
        }

        Some(CacheBlob {
            path: path.to_string(),
            kind,
            platform,
            file_name,
        })
    }

    pub fn cache_id(&self) -> &str {
        archive_stem(&self.file_name)
    }
}

/// Options for [`store_cache`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub group_id: String,
    pub cache_id: String,
    pub compression: Compression,
    /// Added to the bundle as `metadata.yml`.
    pub metadata_file: Option<PathBuf>,
}

/// Bundle the Conan home and harvested debug data and upload them.
///
/// Returns the download URIs of the uploaded blobs.
pub fn store_cache(
    ctx: &GlobalContext,
    client: &ArtifactoryClient,
    opts: &StoreOptions,
) -> Result<Vec<String>> {
    let file_name = cache_file_name(&opts.cache_id, opts.compression);
    let temp_dir = ctx.dirs().temp_dir();
    ensure_dir(&temp_dir)?;

    let mut conan_entries = vec![ArchiveEntry::new(ctx.dirs().conan_home_dir(), CONAN_DIR)];
    if let Some(metadata) = &opts.metadata_file {
        if !metadata.is_file() {
            bail!("metadata file does not exist: {}", metadata.display());
        }
        conan_entries.push(ArchiveEntry::new(metadata, METADATA_FILE));
    }

    let mut uris = Vec::new();
    let conan_path = blob_path(&opts.group_id, BlobKind::Conan, ctx.platform(), &file_name);
    uris.push(pack_and_upload(
        client,
        &temp_dir.join(format!("conan-{}", file_name)),
        opts.compression,
        &conan_entries,
        &conan_path,
    )?);

    let debug_dir = ctx.dirs().debug_processors_dir();
    if debug_dir.is_dir() && !subdirectory_names(&debug_dir)?.is_empty() {
        let debug_path = blob_path(&opts.group_id, BlobKind::Debug, ctx.platform(), &file_name);
        uris.push(pack_and_upload(
            client,
            &temp_dir.join(format!("debug-{}", file_name)),
            opts.compression,
            &[ArchiveEntry::new(&debug_dir, DEBUG_DIR)],
            &debug_path,
        )?);
    }

    Ok(uris)
}

fn pack_and_upload(
    client: &ArtifactoryClient,
    archive: &Path,
    compression: Compression,
    entries: &[ArchiveEntry],
    remote_path: &str,
) -> Result<String> {
    remove_file_if_exists(archive)?;
    let result = pack(archive, compression, entries).and_then(|()| {
        eprintln!("{:>12} {}", "Uploading", remote_path);
        client.upload_file(archive, remote_path)
    });
    remove_file_if_exists(archive)?;

    let uri = result?;
    eprintln!("{:>12} {}", "Uploaded", uri);
    Ok(uri)
}

/// Every file stored for `group_id`.
pub fn list_cache(client: &ArtifactoryClient, group_id: &str) -> Result<Vec<String>> {
    client.list_files(group_id)
}

/// Delete one cache (both of its blobs, on every platform) or a whole group.
///
/// Returns the number of deleted repository paths.
pub fn delete_cache(
    client: &ArtifactoryClient,
    group_id: &str,
    cache_id: Option<&str>,
    compression: Compression,
) -> Result<usize> {
    let Some(cache_id) = cache_id else {
        client.delete(group_id)?;
        eprintln!("{:>12} {}", "Removed", group_id);
        return Ok(1);
    };

    let file_name = cache_file_name(cache_id, compression);
    let blobs: Vec<CacheBlob> = client
        .list_files(group_id)?
        .iter()
        .filter_map(|path| CacheBlob::parse(group_id, path))
        .filter(|blob| blob.file_name == file_name)
        .collect();

    if blobs.is_empty() {
        bail!("cache `{}` not found in group `{}`", file_name, group_id);
    }

    for blob in &blobs {
        client.delete(&blob.path)?;
        eprintln!("{:>12} {}", "Removed", blob.path);
    }
    Ok(blobs.len())
}

/// Download and replay every conan bundle of `group_id`.
///
/// Each bundle is extracted to a scratch directory, which is removed
/// afterwards together with the downloaded archives, even on failure.
pub fn process_conan_cache(
    ctx: &GlobalContext,
    conan: &Conan,
    client: &ArtifactoryClient,
    group_id: &str,
    upload: &UploadOptions,
) -> Result<()> {
    let blobs: Vec<CacheBlob> = client
        .list_files(group_id)?
        .iter()
        .filter_map(|path| CacheBlob::parse(group_id, path))
        .collect();

    let debug_blobs: HashSet<(Platform, String)> = blobs
        .iter()
        .filter(|b| b.kind == BlobKind::Debug)
        .map(|b| (b.platform.clone(), b.file_name.clone()))
        .collect();

    let conan_blobs: Vec<&CacheBlob> = blobs.iter().filter(|b| b.kind == BlobKind::Conan).collect();
    if conan_blobs.is_empty() {
        tracing::warn!("no cached conan bundles in group `{}`", group_id);
    }

    for blob in conan_blobs {
        let bundle_dir = ctx
            .dirs()
            .remote_cache_dir()
            .join(group_id)
            .join(blob.platform.as_str())
            .join(blob.cache_id());
        let downloads = ctx.dirs().temp_dir().join("downloads").join(blob.platform.as_str());
        let conan_archive = downloads.join(format!("conan-{}", blob.file_name));
        let debug_archive = downloads.join(format!("debug-{}", blob.file_name));

        let result = (|| {
            eprintln!("{:>12} {}", "Downloading", blob.path);
            client.get_file(&blob.path, &conan_archive)?;
            unpack(&conan_archive, &bundle_dir)?;

            if debug_blobs.contains(&(blob.platform.clone(), blob.file_name.clone())) {
                let path = blob_path(group_id, BlobKind::Debug, &blob.platform, &blob.file_name);
                eprintln!("{:>12} {}", "Downloading", path);
                client.get_file(&path, &debug_archive)?;
                unpack(&debug_archive, &bundle_dir)?;
            }

            process_bundle(ctx, conan, &bundle_dir, &blob.platform, upload)
        })();

        finish_with_cleanup(result, || {
            remove_tree(&bundle_dir)?;
            remove_file_if_exists(&conan_archive)?;
            remove_file_if_exists(&debug_archive)
        })
        .with_context(|| format!("failed to process cache `{}`", blob.path))?;
    }
    Ok(())
}

/// Replay one extracted bundle.
///
/// `blob_platform` is used when the metadata does not name a platform.
pub fn process_bundle(
    ctx: &GlobalContext,
    conan: &Conan,
    bundle_dir: &Path,
    blob_platform: &Platform,
    upload: &UploadOptions,
) -> Result<()> {
    let metadata_path = bundle_dir.join(METADATA_FILE);
    let metadata = if metadata_path.is_file() {
        CacheMetadata::load(&metadata_path)?
    } else {
        CacheMetadata::default()
    };

    let platform = match metadata.platform.as_deref() {
        Some(name) => name.parse::<Platform>().map_err(anyhow::Error::msg)?,
        None => blob_platform.clone(),
    };

    let conan_home = bundle_dir.join(CONAN_DIR);
    if !conan_home.is_dir() {
        bail!("bundle has no Conan home: {}", bundle_dir.display());
    }

    if platform.is_windows() && !Platform::current().is_windows() {
        let fixed = fix_windows_paths(&conan_home)?;
        tracing::info!("rewrote {} Windows paths in the package index", fixed);
    }

    let bundle_ctx = GlobalContext::new(ctx.dirs().clone(), platform.clone(), ctx.config().clone())?;
    let build_order = load_build_order(
        ctx.dirs(),
        metadata.build_order.as_deref().map(Path::new),
        &platform,
    )?;

    {
        let _env = ConanEnv::enter_with_home(ctx.dirs(), &conan_home);
        let opts = UploadOptions {
            upload_build_tools: metadata.upload_build_tools,
            ..upload.clone()
        };
        upload_all(&bundle_ctx, conan, &opts, &build_order)?;
    }

    process_debug_data(&bundle_ctx, &bundle_dir.join(DEBUG_DIR));
    Ok(())
}

/// Finalize the processors whose harvested data came with a bundle.
///
/// Failures are logged; they never fail the bundle.
fn process_debug_data(ctx: &GlobalContext, debug_dir: &Path) {
    if !debug_dir.is_dir() {
        return;
    }
    let names = match subdirectory_names(debug_dir) {
        Ok(names) => names,
        Err(e) => {
            tracing::warn!("failed to read {}: {:#}", debug_dir.display(), e);
            return;
        }
    };

    let settings = ProcessorSettings::from_context(ctx, false);
    for name in names {
        let kind: ProcessorKind = match name.parse() {
            Ok(kind) => kind,
            Err(e) => {
                tracing::warn!("{}", e);
                continue;
            }
        };

        let mut processors = DebugProcessors::default();
        if processors.push_if_active(kind.create(&settings), Some(&debug_dir.join(&name))) {
            eprintln!("{:>12} debug data with {}", "Processing", kind);
            if let Err(e) = processors.finalize() {
                tracing::warn!("error processing debug data in {}: {:#}", name, e);
            }
        }
    }
}

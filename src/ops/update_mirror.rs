//! Mirroring recipe sources into an artifact store.
//!
//! `conandata.yml` lists where the sources of each version come from:
//!
//! ```yaml
//! sources:
//!   "1.3":
//!     url: "https://zlib.net/zlib-1.3.tar.gz"
//!     sha256: "ff0ba4c2..."
//!   "3.2.1":
//!     source:
//!       urls: ["https://a/x.tar.gz", "https://b/x.tar.gz"]
//!       sha256: "..."
//!     patches:
//!       url: "https://c/patches.zip"
//! ```
//!
//! Each file is copied to `<mirror>/<name>/<version>/<file>` and the mirror
//! URL is appended to the element's URL list.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_yaml::{Mapping, Value};

use crate::conan::recipe_store::recipe_stores;
use crate::core::error::ConfigError;
use crate::core::package_config::scalar_to_string;
use crate::ops::build::finish_with_cleanup;
use crate::remote::artifactory::stream_to_file;
use crate::remote::{ArtifactoryClient, Credentials};
use crate::util::context::GlobalContext;
use crate::util::fs::{ensure_dir, remove_file_if_exists, remove_tree, write_string};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Where the mirror repository is and how to log in.
#[derive(Debug, Clone, Default)]
pub struct MirrorRemote {
    /// Repository URL; `artifactory.mirror_url` when unset.
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub key: Option<String>,
}

impl MirrorRemote {
    pub fn client(&self, ctx: &GlobalContext) -> Result<ArtifactoryClient> {
        let url = self
            .url
            .as_deref()
            .or(ctx.config().artifactory.mirror_url.as_deref())
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::MissingSetting {
                setting: "mirror repository URL",
                hint: "pass --remote or set ARTIFACTORY_MIRROR_URL",
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

/// One downloadable entry of a version's sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcesElement {
    /// Name of the element in a map of elements; `None` for a single element.
    pub key: Option<Value>,
    /// `url` or `urls`.
    pub url_key: &'static str,
    pub urls: Vec<String>,
    pub sha256: Option<String>,
}

impl SourcesElement {
    fn from_mapping(key: Option<Value>, source: &Mapping) -> Option<Self> {
        let url_key = if source.contains_key("urls") { "urls" } else { "url" };
        let urls = match source.get(url_key)? {
            Value::String(url) => vec![url.clone()],
            Value::Sequence(items) => items.iter().filter_map(scalar_to_string).collect(),
            _ => return None,
        };
        let sha256 = source.get("sha256").and_then(scalar_to_string);
        Some(SourcesElement {
            key,
            url_key,
            urls,
            sha256,
        })
    }

    pub fn has_mirror_url(&self, mirror_url: &str) -> bool {
        self.urls.iter().any(|u| u.starts_with(mirror_url))
    }
}

/// Elements of `sources[<version>]`.
pub fn sources_elements(version_sources: &Value) -> Vec<SourcesElement> {
    let Some(mapping) = version_sources.as_mapping() else {
        return Vec::new();
    };

    if mapping.contains_key("url") || mapping.contains_key("urls") {
        return SourcesElement::from_mapping(None, mapping).into_iter().collect();
    }

    mapping
        .iter()
        .filter_map(|(key, source)| {
            SourcesElement::from_mapping(Some(key.clone()), source.as_mapping()?)
        })
        .collect()
}

fn version_entry_mut<'a>(sources: &'a mut Mapping, version: &str) -> Option<&'a mut Value> {
    sources
        .iter_mut()
        .find(|(key, _)| scalar_to_string(key).as_deref() == Some(version))
        .map(|(_, value)| value)
}

fn append_url(version_sources: &mut Value, element: &SourcesElement, url: &str) -> Result<()> {
    let target = match &element.key {
        Some(key) => version_sources
            .get_mut(key)
            .context("sources element disappeared")?,
        None => version_sources,
    };
    let mapping = target
        .as_mapping_mut()
        .context("sources element is not a mapping")?;

    let mut urls: Vec<Value> = element.urls.iter().cloned().map(Value::String).collect();
    urls.push(Value::String(url.to_string()));
    mapping.insert(Value::String(element.url_key.to_string()), Value::Sequence(urls));
    Ok(())
}

/// Download `url` into `dir`, checking the SHA-256 when one is given.
pub fn download_file(
    http: &reqwest::blocking::Client,
    url: &str,
    dir: &Path,
    sha256: Option<&str>,
) -> Result<PathBuf> {
    let file_name = url
        .rsplit('/')
        .next()
        .filter(|n| !n.is_empty())
        .with_context(|| format!("no file name in {}", url))?;

    ensure_dir(dir)?;
    let path = dir.join(file_name);
    remove_file_if_exists(&path)?;

    let response = http
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("GET {} failed", url))?;

    let mut file =
        File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
    let digest = stream_to_file(response, &mut file, file_name)?;
    drop(file);

    if let Some(expected) = sha256 {
        if !digest.eq_ignore_ascii_case(expected) {
            remove_file_if_exists(&path)?;
            bail!(
                "checksum mismatch for {}: expected {}, got {}",
                url,
                expected,
                digest
            );
        }
    }
    Ok(path)
}

/// First URL that downloads with a matching checksum.
fn download_from_mirrors(
    http: &reqwest::blocking::Client,
    element: &SourcesElement,
    dir: &Path,
) -> Option<PathBuf> {
    for url in &element.urls {
        match download_file(http, url, dir, element.sha256.as_deref()) {
            Ok(path) => return Some(path),
            Err(e) => tracing::warn!("{:#}", e),
        }
    }
    None
}

/// Mirror the sources of one version; returns whether `conandata.yml` changed.
pub fn update_conandata(
    http: &reqwest::blocking::Client,
    mirror: &ArtifactoryClient,
    conandata_path: &Path,
    name: &str,
    version: &str,
    scratch_dir: &Path,
) -> Result<bool> {
    if !conandata_path.is_file() {
        tracing::info!("{} does not exist, skipping", conandata_path.display());
        return Ok(false);
    }

    let contents = std::fs::read_to_string(conandata_path)
        .with_context(|| format!("failed to read {}", conandata_path.display()))?;
    let mut conandata: Value = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse {}", conandata_path.display()))?;

    let Some(sources) = conandata.get_mut("sources").and_then(Value::as_mapping_mut) else {
        tracing::info!("{} has no sources, skipping", conandata_path.display());
        return Ok(false);
    };
    let Some(version_sources) = version_entry_mut(sources, version) else {
        tracing::info!("no sources for {}/{}, skipping", name, version);
        return Ok(false);
    };

    let mut modified = false;
    for element in sources_elements(version_sources) {
        let Some(path) = download_from_mirrors(http, &element, scratch_dir) else {
            tracing::warn!("failed to download sources of {}/{}, skipping", name, version);
            continue;
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let remote_path = format!("{}/{}/{}", name, version, file_name);
        let mut mirror_url = mirror.file_url(&remote_path);

        if mirror.file_exists(&remote_path)? {
            tracing::info!("{} is already mirrored", remote_path);
        } else {
            match mirror.upload_file(&path, &remote_path) {
                Ok(uri) => {
                    eprintln!("{:>12} {}", "Mirrored", uri);
                    mirror_url = uri;
                }
                Err(e) => {
                    tracing::warn!("failed to mirror {}: {:#}", remote_path, e);
                    continue;
                }
            }
        }

        if element.has_mirror_url(&mirror_url) {
            continue;
        }
        append_url(version_sources, &element, &mirror_url)?;
        modified = true;
    }

    if modified {
        eprintln!("{:>12} {}", "Updating", conandata_path.display());
        let contents = serde_yaml::to_string(&conandata)?;
        write_string(conandata_path, &contents)?;
    }
    Ok(modified)
}

/// Mirror the sources of every recipe store.
///
/// Only the default version of configured packages is handled unless
/// `all` is set. Returns the number of rewritten `conandata.yml` files.
pub fn update_mirror(ctx: &GlobalContext, mirror: &ArtifactoryClient, all: bool) -> Result<usize> {
    let http = reqwest::blocking::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .context("failed to create HTTP client")?;
    let temp_dir = ctx.dirs().temp_dir();

    let mut updated = 0;
    let result = (|| {
        for store in recipe_stores(ctx, &[], all)? {
            for recipe in store.selected_recipes(ctx, all)? {
                let version = recipe.reference().version();
                let scratch = temp_dir.join(store.name()).join(version);
                if update_conandata(
                    &http,
                    mirror,
                    &recipe.recipe_dir().join("conandata.yml"),
                    store.name(),
                    version,
                    &scratch,
                )? {
                    updated += 1;
                }
            }
        }
        Ok(())
    })();

    finish_with_cleanup(result, || remove_tree(&temp_dir).map(|_| ()))?;
    Ok(updated)
}

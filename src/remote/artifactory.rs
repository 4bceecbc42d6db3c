//! Client for Artifactory-compatible generic blob repositories.

use std::fs::File;
use std::io::{IsTerminal, Read, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use url::Url;

use crate::core::error::ConfigError;
use crate::util::hash::file_digests;
use crate::util::retry::RetryPolicy;

const HTTP_TIMEOUT: Duration = Duration::from_secs(600);
const STREAM_BUFFER_SIZE: usize = 8192;

/// How requests authenticate.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic {
        username: String,
        password: Option<String>,
    },
    Bearer(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Basic { username, .. } => {
                f.debug_struct("Basic").field("username", username).finish()
            }
            Credentials::Bearer(_) => f.write_str("Bearer(..)"),
        }
    }
}

impl Credentials {
    /// Pick credentials from explicit options, falling back to
    /// `ARTIFACTORY_API_KEY` and then `ARTIFACTORY_SYMBOLS_KEY`.
    pub fn resolve<F>(
        username: Option<String>,
        password: Option<String>,
        key: Option<String>,
        lookup: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(username) = username.filter(|u| !u.is_empty()) {
            return Ok(Credentials::Basic { username, password });
        }

        key.filter(|k| !k.is_empty())
            .or_else(|| lookup("ARTIFACTORY_API_KEY").filter(|k| !k.is_empty()))
            .or_else(|| lookup("ARTIFACTORY_SYMBOLS_KEY").filter(|k| !k.is_empty()))
            .map(Credentials::Bearer)
            .ok_or_else(|| {
                ConfigError::MissingSetting {
                    setting: "artifact store credentials",
                    hint: "pass --username/--password or --key, or set ARTIFACTORY_API_KEY",
                }
                .into()
            })
    }

    /// Credentials from the environment only.
    pub fn from_env() -> Result<Self> {
        Self::resolve(None, None, None, |name| std::env::var(name).ok())
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Credentials::Basic { username, password } => {
                request.basic_auth(username, password.as_deref())
            }
            Credentials::Bearer(key) => request.bearer_auth(key),
        }
    }
}

/// Split `https://host/artifactory/<repo>` into base URL and repository.
pub fn split_repository_url(url: &str) -> Result<(String, String)> {
    let trimmed = url.trim_end_matches('/');
    let parsed =
        Url::parse(trimmed).with_context(|| format!("`{}` is not a repository URL", url))?;
    let has_repo = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .is_some_and(|segment| !segment.is_empty());

    match trimmed.rsplit_once('/') {
        Some((base, repo)) if has_repo && parsed.has_host() => {
            Ok((base.to_string(), repo.to_string()))
        }
        _ => bail!("`{}` is not a repository URL (expected <base>/<repo>)", url),
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(rename = "downloadUri")]
    download_uri: String,
}

#[derive(Debug, Deserialize)]
struct AqlResponse {
    results: Vec<AqlItem>,
}

#[derive(Debug, Deserialize)]
struct AqlItem {
    path: String,
    name: String,
}

/// A repository on an Artifactory-compatible server.
#[derive(Debug)]
pub struct ArtifactoryClient {
    base_url: String,
    repo: String,
    credentials: Credentials,
    client: Client,
    retry: RetryPolicy,
}

impl ArtifactoryClient {
    /// Client for a repository URL (`<base>/<repo>`).
    pub fn new(url: &str, credentials: Credentials) -> Result<Self> {
        let (base_url, repo) = split_repository_url(url)?;
        Self::with_repo(&base_url, &repo, credentials)
    }

    pub fn with_repo(base_url: &str, repo: &str, credentials: Credentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to create HTTP client")?;

        Ok(ArtifactoryClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            repo: repo.to_string(),
            credentials,
            client,
            retry: RetryPolicy::network(),
        })
    }

    /// Override the retry policy for uploads.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Absolute URL of a repository path. Absolute URLs below the base are kept.
    pub fn file_url(&self, remote_path: &str) -> String {
        if remote_path.starts_with(&self.base_url) {
            remote_path.to_string()
        } else {
            format!(
                "{}/{}/{}",
                self.base_url,
                self.repo,
                remote_path.trim_start_matches('/')
            )
        }
    }

    /// Upload a file with checksum headers; returns the download URI.
    pub fn upload_file(&self, local_path: &Path, remote_path: &str) -> Result<String> {
        if !local_path.is_file() {
            bail!("file to upload does not exist: {}", local_path.display());
        }

        let digests = file_digests(local_path)?;
        let url = self.file_url(remote_path);
        tracing::info!("uploading {} to {}", local_path.display(), url);

        let response = self.retry.run_if(
            &format!("upload of {}", local_path.display()),
            is_transport_error,
            |_| {
                let file = File::open(local_path)
                    .with_context(|| format!("failed to open {}", local_path.display()))?;
                let request = self
                    .client
                    .put(&url)
                    .header("Content-Type", "application/octet-stream")
                    .header("X-Checksum-Sha1", &digests.sha1)
                    .header("X-Checksum-Sha256", &digests.sha256)
                    .header("X-Checksum-Md5", &digests.md5)
                    .body(file);
                let response = self.credentials.apply(request).send()?;
                Ok(response)
            },
        )?;

        let status = response.status();
        let body = response.text().unwrap_or_default();
        if status != StatusCode::CREATED {
            bail!("failed to upload file to {} ({}): {}", url, status, body);
        }

        let parsed: UploadResponse = serde_json::from_str(&body)
            .with_context(|| format!("unexpected upload response from {}", url))?;
        Ok(parsed.download_uri)
    }

    /// Whether a HEAD request answers 200.
    pub fn file_exists(&self, remote_path: &str) -> Result<bool> {
        let url = self.file_url(remote_path);
        let response = self
            .credentials
            .apply(self.client.head(&url))
            .send()
            .with_context(|| format!("HEAD {} failed", url))?;
        Ok(response.status() == StatusCode::OK)
    }

    /// Download to `local_path`, creating parent directories; returns the SHA-256 hex digest.
    pub fn get_file(&self, remote_path: &str, local_path: &Path) -> Result<String> {
        let url = self.file_url(remote_path);
        let response = self
            .credentials
            .apply(self.client.get(&url))
            .send()
            .with_context(|| format!("GET {} failed", url))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().unwrap_or_default();
            bail!("failed to download file from {} ({}): {}", url, status, body);
        }

        if let Some(parent) = local_path.parent() {
            crate::util::fs::ensure_dir(parent)?;
        }
        let mut file = File::create(local_path)
            .with_context(|| format!("failed to create {}", local_path.display()))?;

        let name = remote_path.rsplit('/').next().unwrap_or(remote_path);
        stream_to_file(response, &mut file, name)
            .with_context(|| format!("failed to download {}", url))
    }

    /// Delete a file; the server must answer 204.
    pub fn delete(&self, remote_path: &str) -> Result<()> {
        let url = self.file_url(remote_path);
        let response = self
            .credentials
            .apply(self.client.delete(&url))
            .send()
            .with_context(|| format!("DELETE {} failed", url))?;

        let status = response.status();
        if status != StatusCode::NO_CONTENT {
            let body = response.text().unwrap_or_default();
            bail!("failed to delete {} ({}): {}", url, status, body);
        }
        Ok(())
    }

    /// Repository paths of every file whose folder starts with `prefix`.
    pub fn list_files(&self, prefix: &str) -> Result<Vec<String>> {
        let url = format!("{}/api/search/aql", self.base_url);
        let query = aql_query(&self.repo, prefix);
        tracing::debug!("AQL: {}", query);

        let response = self
            .credentials
            .apply(self.client.post(&url))
            .header("Content-Type", "text/plain")
            .body(query)
            .send()
            .with_context(|| format!("POST {} failed", url))?;

        let status = response.status();
        let body = response.text().unwrap_or_default();
        if status != StatusCode::OK {
            bail!("failed to list files from {} ({}): {}", self.base_url, status, body);
        }

        let parsed: AqlResponse =
            serde_json::from_str(&body).context("unexpected AQL search response")?;
        Ok(parsed.results.iter().map(item_path).collect())
    }
}

/// Repository path of an AQL item; items at the root have the path `.`.
fn item_path(item: &AqlItem) -> String {
    match item.path.trim_matches('/') {
        "" | "." => item.name.clone(),
        path => format!("{}/{}", path, item.name),
    }
}

fn aql_query(repo: &str, prefix: &str) -> String {
    format!(
        r#"items.find({{"repo": "{}", "path": {{"$match": "{}*"}}}})"#,
        repo, prefix
    )
}

fn is_transport_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<reqwest::Error>())
}

fn progress_bar(total: Option<u64>, name: &str) -> Option<ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let pb = match total {
        Some(len) => ProgressBar::new(len),
        None => ProgressBar::new_spinner(),
    };
    if let Ok(style) =
        ProgressStyle::with_template("{msg} [{bar:30}] {bytes}/{total_bytes} ({eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.set_message(name.to_string());
    Some(pb)
}

pub(crate) fn stream_to_file(mut response: Response, file: &mut File, name: &str) -> Result<String> {
    let bar = progress_bar(response.content_length(), name);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; STREAM_BUFFER_SIZE];
    let mut downloaded = 0u64;

    loop {
        let read = response.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        file.write_all(&buffer[..read])?;
        downloaded += read as u64;
        if let Some(pb) = &bar {
            pb.set_position(downloaded);
        }
    }

    if let Some(pb) = bar {
        pb.finish_and_clear();
    }
    tracing::debug!("downloaded {} bytes", downloaded);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::hash::sha256_bytes;
    use httpmock::Method::{DELETE, GET, HEAD, POST, PUT};
    use httpmock::MockServer;
    use serde_json::json;
    use std::net::TcpListener;
    use tempfile::TempDir;

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn client(server: &MockServer) -> ArtifactoryClient {
        ArtifactoryClient::new(
            &server.url("/artifactory/conan-cache/"),
            Credentials::Bearer("secret".into()),
        )
        .unwrap()
        .with_retry(RetryPolicy::once())
    }

    #[test]
    fn test_split_repository_url() {
        let (base, repo) =
            split_repository_url("https://example.com/artifactory/audacity-cache//").unwrap();
        assert_eq!(base, "https://example.com/artifactory");
        assert_eq!(repo, "audacity-cache");
        assert!(split_repository_url("no-slashes").is_err());
        assert!(split_repository_url("https://example.com/").is_err());
    }

    #[test]
    fn test_credentials_resolution() {
        let env = |name: &str| match name {
            "ARTIFACTORY_SYMBOLS_KEY" => Some("symbols".to_string()),
            _ => None,
        };
        assert_eq!(
            Credentials::resolve(None, None, None, env).unwrap(),
            Credentials::Bearer("symbols".into())
        );
        assert_eq!(
            Credentials::resolve(None, None, Some("cli".into()), env).unwrap(),
            Credentials::Bearer("cli".into())
        );
        assert!(matches!(
            Credentials::resolve(Some("me".into()), Some("pw".into()), None, env).unwrap(),
            Credentials::Basic { .. }
        ));

        let err = Credentials::resolve(None, None, None, |_| None).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_aql_query() {
        assert_eq!(
            aql_query("cache", "group/conan"),
            r#"items.find({"repo": "cache", "path": {"$match": "group/conan*"}})"#
        );
    }

    #[test]
    fn test_file_url() {
        let client = ArtifactoryClient::with_repo(
            "https://example.com/artifactory",
            "repo",
            Credentials::Bearer("k".into()),
        )
        .unwrap();
        assert_eq!(
            client.file_url("a/b.tar.xz"),
            "https://example.com/artifactory/repo/a/b.tar.xz"
        );
        assert_eq!(
            client.file_url("https://example.com/artifactory/other/x"),
            "https://example.com/artifactory/other/x"
        );
    }

    #[test]
    fn test_upload_sends_checksums() {
        if !can_bind_localhost() {
            eprintln!("Skipping httpmock tests: cannot bind to localhost");
            return;
        }
        let server = MockServer::start();
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("abc.tar.xz");
        std::fs::write(&file, b"hello").unwrap();

        let mock = server.mock(|when, then| {
            when.method(PUT)
                .path("/artifactory/conan-cache/group/conan/linux/abc.tar.xz")
                .header("authorization", "Bearer secret")
                .header("x-checksum-sha1", "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d")
                .header(
                    "x-checksum-sha256",
                    "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
                )
                .header("x-checksum-md5", "5d41402abc4b2a76b9719d911017c592");
            then.status(201).json_body(json!({
                "downloadUri": "https://example.com/conan-cache/group/conan/linux/abc.tar.xz"
            }));
        });

        let uri = client(&server)
            .upload_file(&file, "group/conan/linux/abc.tar.xz")
            .unwrap();
        mock.assert();
        assert!(uri.ends_with("abc.tar.xz"));
    }

    #[test]
    fn test_upload_rejects_non_created() {
        if !can_bind_localhost() {
            return;
        }
        let server = MockServer::start();
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("x");
        std::fs::write(&file, b"x").unwrap();

        server.mock(|when, then| {
            when.method(PUT);
            then.status(409).body("conflict");
        });

        let err = client(&server).upload_file(&file, "x").unwrap_err();
        assert!(format!("{:#}", err).contains("conflict"));
    }

    #[test]
    fn test_get_file_returns_sha256() {
        if !can_bind_localhost() {
            return;
        }
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/artifactory/conan-cache/g/a.tar");
            then.status(200).body("payload");
        });
        server.mock(|when, then| {
            when.method(GET).path("/artifactory/conan-cache/g/missing");
            then.status(404);
        });

        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("nested/a.tar");
        let client = client(&server);
        let digest = client.get_file("g/a.tar", &dest).unwrap();
        assert_eq!(digest, sha256_bytes(b"payload"));
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");

        assert!(client.get_file("g/missing", &tmp.path().join("m")).is_err());
    }

    #[test]
    fn test_exists_delete_and_list() {
        if !can_bind_localhost() {
            return;
        }
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(HEAD).path("/artifactory/conan-cache/present");
            then.status(200);
        });
        server.mock(|when, then| {
            when.method(HEAD).path("/artifactory/conan-cache/absent");
            then.status(404);
        });
        let delete = server.mock(|when, then| {
            when.method(DELETE).path("/artifactory/conan-cache/group/conan/linux/abc.tar.xz");
            then.status(204);
        });
        let list = server.mock(|when, then| {
            when.method(POST)
                .path("/artifactory/api/search/aql")
                .body_contains(r#""$match": "group*""#);
            then.status(200).json_body(json!({
                "results": [
                    {"repo": "conan-cache", "path": "group/conan/linux", "name": "abc.tar.xz"},
                    {"repo": "conan-cache", "path": ".", "name": "root.txt"}
                ]
            }));
        });

        let client = client(&server);
        assert!(client.file_exists("present").unwrap());
        assert!(!client.file_exists("absent").unwrap());
        client.delete("group/conan/linux/abc.tar.xz").unwrap();
        delete.assert();

        let files = client.list_files("group").unwrap();
        list.assert();
        assert_eq!(files, ["group/conan/linux/abc.tar.xz", "root.txt"]);
    }

    #[test]
    fn test_item_path_at_repository_root() {
        let item = |path: &str, name: &str| AqlItem {
            path: path.into(),
            name: name.into(),
        };
        assert_eq!(item_path(&item(".", "abc.tar.xz")), "abc.tar.xz");
        assert_eq!(item_path(&item("", "abc.tar.xz")), "abc.tar.xz");
        assert_eq!(item_path(&item("g/conan/linux", "abc.tar.xz")), "g/conan/linux/abc.tar.xz");
    }
}

//! Hashing utilities for checksums.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Compute SHA256 hash of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Checksums the artifact store verifies on upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigests {
    pub sha1: String,
    pub sha256: String,
    pub md5: String,
}

/// Compute SHA-1, SHA-256 and MD5 of a file in a single pass.
pub fn file_digests(path: &Path) -> Result<FileDigests> {
    let file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut reader = BufReader::new(file);
    let mut sha1 = Sha1::new();
    let mut sha256 = Sha256::new();
    let mut md5 = Md5::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        sha1.update(&buffer[..bytes_read]);
        sha256.update(&buffer[..bytes_read]);
        md5.update(&buffer[..bytes_read]);
    }

    Ok(FileDigests {
        sha1: hex::encode(sha1.finalize()),
        sha256: hex::encode(sha256.finalize()),
        md5: hex::encode(md5.finalize()),
    })
}

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::core::error::{SyncError, SyncResult};

const HASH_CHUNK: usize = 64 * 1024;

/// Lowercase hex MD5 of a file's content: cache key and corruption check.
///
/// MD5 guards against truncation and bit rot only. It must not be relied on
/// to detect deliberate tampering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Fingerprint(String);

impl From<String> for Fingerprint {
    fn from(hex: String) -> Self {
        Self::from_hex(hex)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

impl Fingerprint {
    /// Wrap a hex digest as published by the catalog or stored in the index.
    pub fn from_hex(hex: impl AsRef<str>) -> Self {
        Self(hex.as_ref().trim().to_ascii_lowercase())
    }

    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(Md5::digest(bytes)))
    }

    /// Hash a file in fixed-size chunks. Blocking.
    pub fn of_file_blocking(path: &Path) -> SyncResult<Self> {
        let mut file = std::fs::File::open(path).map_err(|e| SyncError::io(path, e))?;
        let mut hasher = Md5::new();
        let mut buf = vec![0u8; HASH_CHUNK];
        loop {
            let n = file.read(&mut buf).map_err(|e| SyncError::io(path, e))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hex::encode(hasher.finalize())))
    }

    /// Hash a file on the blocking pool so large files never stall the runtime.
    pub async fn of_file(path: &Path) -> SyncResult<Self> {
        let owned: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::of_file_blocking(&owned))
            .await
            .map_err(|e| SyncError::Other(format!("Task join error: {e}")))?
    }

    /// Hash an in-memory payload on the blocking pool.
    pub async fn of_payload(bytes: std::sync::Arc<Vec<u8>>) -> SyncResult<Self> {
        tokio::task::spawn_blocking(move || Self::of_bytes(&bytes))
            .await
            .map_err(|e| SyncError::Other(format!("Task join error: {e}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

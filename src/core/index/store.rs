use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::downloader::install_atomically;
use crate::core::error::{SyncError, SyncResult};
use crate::core::verify::Fingerprint;

/// One installed artifact as persisted in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    #[serde(rename = "hash")]
    pub fingerprint: Fingerprint,
    pub version: String,
}

/// Durable manifest of installed mods (`.nrc-index.json`).
///
/// Read in full at run start, rewritten in full at run end. It is a cache
/// index: every record describes a file that was present and matching when
/// the manifest was written.
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the manifest. A missing file is an empty manifest.
    ///
    /// An unreadable document is also treated as empty: the worst outcome is
    /// that installed mods get fetched again.
    pub async fn load(&self) -> SyncResult<Vec<IndexRecord>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No manifest at {:?}, starting empty", self.path);
                return Ok(Vec::new());
            }
            Err(e) => return Err(SyncError::io(&self.path, e)),
        };

        match serde_json::from_slice::<Vec<IndexRecord>>(&raw) {
            Ok(records) => {
                debug!("Loaded {} manifest records", records.len());
                Ok(records)
            }
            Err(e) => {
                warn!("Corrupt manifest {:?} ignored: {}", self.path, e);
                Ok(Vec::new())
            }
        }
    }

    /// Replace the manifest atomically (temp file + rename).
    pub async fn write(&self, records: &[IndexRecord]) -> SyncResult<()> {
        let json = serde_json::to_vec_pretty(records)?;
        install_atomically(&self.path, &json).await?;
        info!("Wrote {} records to {:?}", records.len(), self.path);
        Ok(())
    }
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use futures_util::stream::{self, StreamExt};
use tracing::{debug, warn};

use super::store::IndexRecord;
use crate::core::error::{SyncError, SyncResult};
use crate::core::verify::Fingerprint;

/// A manifest record whose file is actually on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledMod {
    pub id: String,
    pub version: String,
    pub fingerprint: Fingerprint,
    pub path: PathBuf,
}

/// Fingerprints of every mod archive found in the mods directory.
#[derive(Debug, Clone, Default)]
pub struct LocalInventory {
    by_fingerprint: HashMap<Fingerprint, PathBuf>,
    by_path: HashMap<PathBuf, Fingerprint>,
}

impl LocalInventory {
    /// Hash every `*.jar` and `*.jar.disabled` in `mods_dir`.
    ///
    /// A missing directory is an empty inventory. Files that cannot be read
    /// are skipped with a warning.
    pub async fn scan(mods_dir: &Path, concurrency: usize) -> SyncResult<Self> {
        let mut candidates = Vec::new();
        match tokio::fs::read_dir(mods_dir).await {
            Ok(mut entries) => {
                while let Some(entry) = entries
                    .next_entry()
                    .await
                    .map_err(|e| SyncError::io(mods_dir, e))?
                {
                    let name = entry.file_name().to_string_lossy().to_string();
                    if is_mod_archive(&name) {
                        candidates.push(entry.path());
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(SyncError::io(mods_dir, e)),
        }
        candidates.sort();

        let hashed: Vec<(PathBuf, SyncResult<Fingerprint>)> = stream::iter(candidates)
            .map(|path| async move {
                let fp = Fingerprint::of_file(&path).await;
                (path, fp)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let mut inventory = Self::default();
        for (path, fp) in hashed {
            match fp {
                Ok(fp) => inventory.insert(path, fp),
                Err(e) => warn!("Skipping unreadable mod file {:?}: {}", path, e),
            }
        }
        debug!(
            "Found {} mod archives in {:?}",
            inventory.by_path.len(),
            mods_dir
        );
        Ok(inventory)
    }

    fn insert(&mut self, path: PathBuf, fp: Fingerprint) {
        // identical copies: keep the lexically first path
        self.by_fingerprint
            .entry(fp.clone())
            .and_modify(|existing| {
                if path < *existing {
                    *existing = path.clone();
                }
            })
            .or_insert_with(|| path.clone());
        self.by_path.insert(path, fp);
    }

    pub fn path_of(&self, fp: &Fingerprint) -> Option<&PathBuf> {
        self.by_fingerprint.get(fp)
    }

    /// Match manifest records to files by fingerprint.
    ///
    /// Records without a matching file are dropped: their artifact is treated
    /// as not installed.
    pub fn correlate(&self, records: &[IndexRecord]) -> HashMap<String, InstalledMod> {
        records
            .iter()
            .filter_map(|record| {
                let path = self.path_of(&record.fingerprint)?;
                Some((
                    record.id.clone(),
                    InstalledMod {
                        id: record.id.clone(),
                        version: record.version.clone(),
                        fingerprint: record.fingerprint.clone(),
                        path: path.clone(),
                    },
                ))
            })
            .collect()
    }

    /// Path → fingerprint table for the verifier.
    pub fn known_fingerprints(&self) -> HashMap<PathBuf, Fingerprint> {
        self.by_path.clone()
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

fn is_mod_archive(name: &str) -> bool {
    name.ends_with(".jar") || name.ends_with(".jar.disabled")
}

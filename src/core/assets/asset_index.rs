use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path};

use futures_util::future::try_join_all;
use serde::Deserialize;
use tracing::{debug, info};

use crate::core::downloader::Transport;
use crate::core::error::{SyncError, SyncResult};
use crate::core::verify::Fingerprint;

/// Per-pack asset metadata as served by the asset API.
#[derive(Debug, Deserialize)]
pub struct AssetIndex {
    pub objects: HashMap<String, AssetObject>,
}

#[derive(Debug, Deserialize)]
pub struct AssetObject {
    pub hash: String,
    #[serde(default)]
    pub size: u64,
}

/// One file of the merged asset tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetEntry {
    /// Relative path, unique key within the merged tree.
    pub path: String,
    pub fingerprint: Fingerprint,
    pub size: u64,
    /// Asset pack that supplied the winning entry.
    pub pack: String,
}

impl AssetIndex {
    /// Fetch and validate the metadata of one asset pack.
    ///
    /// Any failure is a `MetadataFetchFailed` for that pack; partial data is
    /// never returned.
    pub async fn fetch(transport: &dyn Transport, url_template: &str, pack: &str) -> SyncResult<Self> {
        let url = url_template.replace("{pack}", pack);
        let failed = |reason: String| SyncError::MetadataFetchFailed {
            pack: pack.to_string(),
            reason,
        };

        let body = transport.fetch(&url).await.map_err(|e| failed(e.to_string()))?;
        let index: AssetIndex =
            serde_json::from_slice(&body).map_err(|e| failed(e.to_string()))?;

        if let Some(bad) = index.objects.keys().find(|p| !is_safe_relative(p)) {
            return Err(failed(format!("unsafe asset path '{bad}'")));
        }
        if let Some((path, _)) = index.objects.iter().find(|(_, o)| o.hash.trim().is_empty()) {
            return Err(failed(format!("asset '{path}' has no hash")));
        }

        debug!("Asset pack '{}' lists {} files", pack, index.objects.len());
        Ok(index)
    }

    /// Fetch metadata for every pack concurrently; the first failure wins.
    pub async fn fetch_all(
        transport: &dyn Transport,
        url_template: &str,
        packs: &[String],
    ) -> SyncResult<Vec<(String, AssetIndex)>> {
        let fetches = packs.iter().map(|pack| async move {
            let index = Self::fetch(transport, url_template, pack).await?;
            Ok::<_, SyncError>((pack.clone(), index))
        });
        try_join_all(fetches).await
    }
}

/// Merged view of every resolved asset pack, keyed by relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetTree {
    entries: BTreeMap<String, AssetEntry>,
}

impl AssetTree {
    /// Merge indexes given in resolution order (root first).
    ///
    /// Packs are applied back to front with last-writer-wins, so on a path
    /// collision the pack closest to the root keeps the entry.
    pub fn merge(indexes: Vec<(String, AssetIndex)>) -> Self {
        let mut entries = BTreeMap::new();
        for (pack, index) in indexes.into_iter().rev() {
            for (path, object) in index.objects {
                entries.insert(
                    path.clone(),
                    AssetEntry {
                        path,
                        fingerprint: Fingerprint::from_hex(&object.hash),
                        size: object.size,
                        pack: pack.clone(),
                    },
                );
            }
        }
        info!("Merged asset tree: {} files", entries.len());
        Self { entries }
    }

    /// Drop entries by path (ignore list, local overrides).
    pub fn remove_where(&mut self, mut skip: impl FnMut(&str) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|path, _| !skip(path));
        before - self.entries.len()
    }

    pub fn get(&self, path: &str) -> Option<&AssetEntry> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> impl Iterator<Item = AssetEntry> {
        self.entries.into_values()
    }
}

impl AssetEntry {
    pub fn download_url(&self, url_template: &str) -> String {
        url_template
            .replace("{pack}", &self.pack)
            .replace("{path}", &self.path)
    }
}

/// Relative, non-empty, no `..`, no root, no drive prefix.
pub fn is_safe_relative(path: &str) -> bool {
    if path.is_empty() || path.contains('\\') {
        return false;
    }
    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
}

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::core::downloader::install_atomically;
use crate::core::error::{SyncError, SyncResult};

/// Locally supplied asset files that take precedence over downloaded ones.
///
/// Layout: `<overrides>/<subtree>/<relative asset path>`. Subtrees are merged
/// in lexical name order; a later subtree replaces an earlier one's file at
/// the same relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideSet {
    /// relative asset path → source file
    files: BTreeMap<String, PathBuf>,
}

impl OverrideSet {
    /// Collect overrides from `root`. A missing root is an empty set.
    pub async fn load(root: &Path) -> SyncResult<Self> {
        let root = root.to_path_buf();
        tokio::task::spawn_blocking(move || Self::collect(&root))
            .await
            .map_err(|e| SyncError::Other(format!("Task join error: {e}")))?
    }

    /// Blocking variant of [`OverrideSet::load`].
    pub fn collect(root: &Path) -> SyncResult<Self> {
        let mut files = BTreeMap::new();
        if !root.is_dir() {
            return Ok(Self { files });
        }

        let mut subtrees: Vec<PathBuf> = std::fs::read_dir(root)
            .map_err(|e| SyncError::io(root, e))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        subtrees.sort();

        for subtree in subtrees {
            let mut found = Vec::new();
            walk_files(&subtree, &subtree, &mut found)?;
            for (relative, source) in found {
                if let Some(previous) = files.insert(relative.clone(), source) {
                    warn!(
                        "Override {} from {:?} replaces {:?}",
                        relative, subtree, previous
                    );
                }
            }
        }

        debug!("Collected {} override files from {:?}", files.len(), root);
        Ok(Self { files })
    }

    pub fn contains(&self, relative: &str) -> bool {
        self.files.contains_key(relative)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PathBuf)> {
        self.files.iter()
    }

    /// Copy every override onto the assets tree, skipping identical files.
    ///
    /// Returns the overrides that could not be applied.
    pub async fn apply(&self, assets_dir: &Path) -> Vec<(String, SyncError)> {
        let mut failures = Vec::new();
        let mut applied = 0usize;

        for (relative, source) in &self.files {
            let dest = assets_dir.join(relative);
            match apply_one(source, &dest).await {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Cannot apply override {}: {}", relative, e);
                    failures.push((relative.clone(), e));
                }
            }
        }

        if applied > 0 {
            info!("Applied {} asset overrides", applied);
        }
        failures
    }
}

async fn apply_one(source: &Path, dest: &Path) -> SyncResult<bool> {
    let bytes = tokio::fs::read(source)
        .await
        .map_err(|e| SyncError::io(source, e))?;
    if let Ok(current) = tokio::fs::read(dest).await {
        if current == bytes {
            return Ok(false);
        }
    }
    install_atomically(dest, &bytes).await?;
    Ok(true)
}

fn walk_files(base: &Path, dir: &Path, out: &mut Vec<(String, PathBuf)>) -> SyncResult<()> {
    for entry in std::fs::read_dir(dir).map_err(|e| SyncError::io(dir, e))? {
        let entry = entry.map_err(|e| SyncError::io(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| SyncError::io(&path, e))?;

        if file_type.is_dir() {
            walk_files(base, &path, out)?;
        } else if file_type.is_file() {
            out.push((relative_key(base, &path), path));
        }
    }
    Ok(())
}

/// `/`-separated path of `path` below `base`.
pub(crate) fn relative_key(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

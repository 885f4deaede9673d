use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::core::error::{SyncError, SyncResult};

/// Mod loaders a pack can target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LoaderType {
    Vanilla,
    Forge,
    Fabric,
    NeoForge,
    Quilt,
}

impl std::fmt::Display for LoaderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoaderType::Vanilla => write!(f, "vanilla"),
            LoaderType::Forge => write!(f, "forge"),
            LoaderType::Fabric => write!(f, "fabric"),
            LoaderType::NeoForge => write!(f, "neoforge"),
            LoaderType::Quilt => write!(f, "quilt"),
        }
    }
}

impl FromStr for LoaderType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vanilla" => Ok(LoaderType::Vanilla),
            "forge" => Ok(LoaderType::Forge),
            "fabric" => Ok(LoaderType::Fabric),
            "neoforge" => Ok(LoaderType::NeoForge),
            "quilt" => Ok(LoaderType::Quilt),
            other => Err(SyncError::MalformedCatalog(format!(
                "unknown loader type '{other}'"
            ))),
        }
    }
}

/// What the local instance runs: the game version and loader that the
/// resolved pack must be compatible with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceTarget {
    pub game_version: String,
    pub loader: LoaderType,
    pub loader_version: Option<String>,
}

/// On-disk layout of the instance being synchronized.
///
/// - `mods/`: installed mod archives (`*.jar`, `*.jar.disabled`)
/// - `NoRiskClient/assets/`: merged asset tree, addressed by relative path
/// - `nrc_asset_overrides/`: local override subtrees
/// - `.nrc-index.json`: manifest of installed mods
#[derive(Debug, Clone)]
pub struct InstanceLayout {
    pub root: PathBuf,
    pub mods_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub overrides_dir: PathBuf,
    pub index_path: PathBuf,
}

impl InstanceLayout {
    /// Resolve the configured relative locations against `root`.
    pub fn new(
        root: &Path,
        mods_dir: &Path,
        assets_dir: &Path,
        overrides_dir: &Path,
        index_file: &Path,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            mods_dir: root.join(mods_dir),
            assets_dir: root.join(assets_dir),
            overrides_dir: root.join(overrides_dir),
            index_path: root.join(index_file),
        }
    }

    /// Create the install directories eagerly so later stages can assume them.
    pub async fn prepare(&self) -> SyncResult<()> {
        tokio::try_join!(
            create_dir_safe(&self.mods_dir),
            create_dir_safe(&self.assets_dir),
            create_dir_safe(&self.overrides_dir),
        )?;
        Ok(())
    }

    /// Absolute install path of an asset given its tree-relative path.
    pub fn asset_path(&self, relative: &str) -> PathBuf {
        self.assets_dir.join(relative)
    }
}

async fn create_dir_safe(path: &Path) -> SyncResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| SyncError::io(path, source))
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::error::{SyncError, SyncResult};
use crate::core::instance::{InstanceLayout, InstanceTarget, LoaderType};
use crate::core::source::REGISTRY_MAVEN;

pub const SETTINGS_FILE: &str = "packsync.json";

/// Everything a run needs to know. Loaded from `packsync.json` when present;
/// every field has a default except the game version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub pack_id: String,
    pub game_version: Option<String>,
    pub loader: LoaderType,
    pub loader_version: Option<String>,

    pub mods_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub overrides_dir: PathBuf,
    pub index_file: PathBuf,

    pub catalog_url: String,
    /// `{pack}` is replaced by the asset-pack id.
    pub asset_metadata_url: String,
    /// `{pack}` and `{path}` are replaced per asset.
    pub asset_download_url: String,
    pub registry_maven_url: String,

    pub max_concurrent_downloads: usize,
    pub request_timeout_secs: u64,

    pub core_archive_id: String,
    /// Directory below the assets tree whose files are injected into the core archive.
    pub patch_source: PathBuf,
    /// Prefix of the injected entries inside the archive.
    pub patch_prefix: String,
    pub ignored_asset_paths: Vec<String>,

    /// Keep the manifest record of a mod whose update failed while its old file remains.
    pub retain_failed_records: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            pack_id: "norisk-prod".into(),
            game_version: None,
            loader: LoaderType::Fabric,
            loader_version: None,
            mods_dir: PathBuf::from("mods"),
            assets_dir: PathBuf::from("NoRiskClient/assets"),
            overrides_dir: PathBuf::from("nrc_asset_overrides"),
            index_file: PathBuf::from(".nrc-index.json"),
            catalog_url: "https://api.norisk.gg/api/v1/launcher/modpacks".into(),
            asset_metadata_url: "https://api.norisk.gg/api/v1/launcher/assets/{pack}".into(),
            asset_download_url: "https://cdn.norisk.gg/assets/{pack}/assets/{path}".into(),
            registry_maven_url: REGISTRY_MAVEN.into(),
            max_concurrent_downloads: 20,
            request_timeout_secs: 60,
            core_archive_id: "nrc-core".into(),
            patch_source: PathBuf::from("nrc-cosmetics/assets"),
            patch_prefix: "assets".into(),
            ignored_asset_paths: vec!["nrc-cosmetics/pack.mcmeta".into()],
            retain_failed_records: false,
        }
    }
}

impl SyncSettings {
    /// Read `packsync.json` from `dir`. Missing file → defaults.
    pub fn load_from_dir(dir: &Path) -> SyncResult<Self> {
        let path = dir.join(SETTINGS_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No {} in {:?}, using defaults", SETTINGS_FILE, dir);
                return Ok(Self::default());
            }
            Err(e) => return Err(SyncError::io(&path, e)),
        };
        let settings: Self = serde_json::from_str(&raw)
            .map_err(|e| SyncError::Config(format!("{}: {e}", path.display())))?;
        info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    pub fn save_to_dir(&self, dir: &Path) -> SyncResult<()> {
        let path = dir.join(SETTINGS_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|e| SyncError::io(&path, e))
    }

    /// Reject settings a run cannot work with.
    pub fn validate(&self) -> SyncResult<()> {
        if self.pack_id.trim().is_empty() {
            return Err(SyncError::Config("pack_id is empty".into()));
        }
        if self.game_version.as_deref().map_or(true, |v| v.trim().is_empty()) {
            return Err(SyncError::Config("game_version is not set".into()));
        }
        if !self.asset_metadata_url.contains("{pack}") {
            return Err(SyncError::Config(
                "asset_metadata_url must contain {pack}".into(),
            ));
        }
        if !self.asset_download_url.contains("{path}") {
            return Err(SyncError::Config(
                "asset_download_url must contain {path}".into(),
            ));
        }
        Ok(())
    }

    pub fn target(&self) -> SyncResult<InstanceTarget> {
        self.validate()?;
        Ok(InstanceTarget {
            game_version: self.game_version.clone().unwrap_or_default(),
            loader: self.loader,
            loader_version: self.loader_version.clone(),
        })
    }

    pub fn layout(&self, root: &Path) -> InstanceLayout {
        InstanceLayout::new(
            root,
            &self.mods_dir,
            &self.assets_dir,
            &self.overrides_dir,
            &self.index_file,
        )
    }

    pub fn concurrency(&self) -> usize {
        self.max_concurrent_downloads.max(1)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

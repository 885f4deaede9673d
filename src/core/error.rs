use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the synchronizer.
/// Every fallible operation returns `Result<T, SyncError>`.
///
/// Per-artifact download failures are not represented here: they end up as
/// `ArtifactOutcome::Failed` in the run report and never abort a run.
#[derive(Debug, Error)]
pub enum SyncError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    // ── Integrity ───────────────────────────────────────
    #[error("Fingerprint mismatch for {path:?}: expected {expected}, got {actual}")]
    FingerprintMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── Catalog ─────────────────────────────────────────
    #[error("Malformed catalog: {0}")]
    MalformedCatalog(String),

    #[error("Asset metadata for pack '{pack}' unavailable: {reason}")]
    MetadataFetchFailed { pack: String, reason: String },

    // ── Pre-flight ──────────────────────────────────────
    #[error("Unknown pack: {0}")]
    UnknownPack(String),

    #[error(
        "Pack '{pack}' is not compatible with game version {game_version} (available: {})",
        available.join(", ")
    )]
    PackIncompatible {
        pack: String,
        game_version: String,
        available: Vec<String>,
    },

    #[error("Pack requires loader {required}, but the instance runs {target}")]
    LoaderMismatch { required: String, target: String },

    // ── Archive ─────────────────────────────────────────
    #[error("Failed to patch archive {path:?}: {reason}")]
    ArchivePatchFailed { path: PathBuf, reason: String },

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Settings ────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    Config(String),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type SyncResult<T> = Result<T, SyncError>;

impl From<std::io::Error> for SyncError {
    fn from(source: std::io::Error) -> Self {
        SyncError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl SyncError {
    /// Wrap an IO error with the path it happened at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error aborts the run before any transfer was started.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            SyncError::UnknownPack(_)
                | SyncError::PackIncompatible { .. }
                | SyncError::LoaderMismatch { .. }
                | SyncError::MalformedCatalog(_)
                | SyncError::MetadataFetchFailed { .. }
        )
    }
}

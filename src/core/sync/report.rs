use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::downloader::{ArtifactKind, DownloadFailure};
use crate::core::verify::Fingerprint;

/// Final state of one artifact after a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ArtifactOutcome {
    /// Local copy already matched.
    Verified,
    /// Fetched this run and fingerprint-confirmed.
    Downloaded,
    /// Every candidate failed; the previous local file, if any, is untouched.
    Failed(DownloadFailure),
}

/// One artifact the run was responsible for. Discarded when the run ends.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedArtifact {
    pub id: String,
    pub kind: ArtifactKind,
    /// Candidate URLs in fallback order.
    pub urls: Vec<String>,
    pub target: PathBuf,
    pub expected: Option<Fingerprint>,
    /// Mod version identifier; empty for assets.
    pub version: String,
    /// Fingerprint of the file on disk once the run is over.
    pub fingerprint: Option<Fingerprint>,
    pub outcome: ArtifactOutcome,
}

impl ResolvedArtifact {
    pub fn is_present(&self) -> bool {
        matches!(
            self.outcome,
            ArtifactOutcome::Verified | ArtifactOutcome::Downloaded
        )
    }
}

/// Aggregate result of a run that was not aborted.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pack_id: String,
    pub warnings: Vec<String>,
    pub mods: Vec<ResolvedArtifact>,
    pub assets: Vec<ResolvedArtifact>,
    /// Fingerprint of the core archive after patching, when a patch ran.
    pub patched: Option<Fingerprint>,
}

impl RunReport {
    pub fn artifacts(&self) -> impl Iterator<Item = &ResolvedArtifact> {
        self.mods.iter().chain(self.assets.iter())
    }

    pub fn failures(&self) -> Vec<&DownloadFailure> {
        self.artifacts()
            .filter_map(|a| match &a.outcome {
                ArtifactOutcome::Failed(failure) => Some(failure),
                _ => None,
            })
            .collect()
    }

    pub fn downloaded_count(&self) -> usize {
        self.artifacts()
            .filter(|a| a.outcome == ArtifactOutcome::Downloaded)
            .count()
    }

    pub fn verified_count(&self) -> usize {
        self.artifacts()
            .filter(|a| a.outcome == ArtifactOutcome::Verified)
            .count()
    }

    pub fn is_clean(&self) -> bool {
        self.failures().is_empty()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

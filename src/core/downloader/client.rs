use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::transport::Transport;
use crate::core::error::{SyncError, SyncResult};
use crate::core::verify::Fingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Mod,
    Asset,
}

/// A single stale artifact to fetch and install.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub id: String,
    pub kind: ArtifactKind,
    /// Candidates, tried in order; first success wins.
    pub urls: Vec<String>,
    pub dest: PathBuf,
    /// Payload must hash to this when known.
    pub expected: Option<Fingerprint>,
    /// Previously installed file for the same id, removed once `dest` is in place.
    pub retire: Option<PathBuf>,
}

/// A job that ended with a fresh, fingerprint-confirmed file at `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installed {
    pub path: PathBuf,
    pub fingerprint: Fingerprint,
    pub url: String,
}

/// A job whose every candidate failed. The previous local copy is untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadFailure {
    pub id: String,
    pub kind: ArtifactKind,
    pub reason: String,
}

pub type DownloadResult = Result<Installed, DownloadFailure>;

/// Concurrent, fingerprint-validated downloader.
///
/// One semaphore gates every transfer this downloader starts, whichever batch
/// the transfer belongs to.
pub struct Downloader {
    transport: Arc<dyn Transport>,
    permits: Arc<Semaphore>,
    /// Maximum number of in-flight transfers.
    concurrency: usize,
}

impl Downloader {
    pub fn new(transport: Arc<dyn Transport>, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            transport,
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        }
    }

    // ── Batch downloads ─────────────────────────────────

    /// Run every job to completion. A failing job never cancels its siblings.
    ///
    /// Results come back in job order.
    pub async fn download_batch(&self, jobs: Vec<DownloadJob>) -> Vec<(DownloadJob, DownloadResult)> {
        if jobs.is_empty() {
            return Vec::new();
        }
        info!(
            "Starting batch download: {} files, concurrency={}",
            jobs.len(),
            self.concurrency
        );

        let mut results: Vec<_> = stream::iter(jobs.into_iter().enumerate())
            .map(|(idx, job)| async move {
                let result = self.download(&job).await;
                (idx, job, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        results.sort_by_key(|(idx, _, _)| *idx);

        let failed = results.iter().filter(|(_, _, r)| r.is_err()).count();
        if failed > 0 {
            warn!("{} of {} downloads failed", failed, results.len());
        }

        results
            .into_iter()
            .map(|(_, job, result)| (job, result))
            .collect()
    }

    // ── Single artifact ─────────────────────────────────

    /// Try each candidate in order until one yields an acceptable payload,
    /// then install it atomically.
    #[instrument(skip(self, job), fields(id = %job.id))]
    pub async fn download(&self, job: &DownloadJob) -> DownloadResult {
        let fail = |reason: String| DownloadFailure {
            id: job.id.clone(),
            kind: job.kind,
            reason,
        };

        if job.urls.is_empty() {
            return Err(fail("no download candidates".into()));
        }

        let mut last_err: Option<SyncError> = None;
        for url in &job.urls {
            let payload = match self.fetch(url).await {
                Ok(bytes) => Arc::new(bytes),
                Err(e) => {
                    debug!("Candidate {} failed for {}: {}", url, job.id, e);
                    last_err = Some(e);
                    continue;
                }
            };

            let fingerprint = match Fingerprint::of_payload(payload.clone()).await {
                Ok(fp) => fp,
                Err(e) => return Err(fail(e.to_string())),
            };
            if let Some(expected) = &job.expected {
                if &fingerprint != expected {
                    debug!("Candidate {} for {} has the wrong content", url, job.id);
                    last_err = Some(SyncError::FingerprintMismatch {
                        path: job.dest.clone(),
                        expected: expected.to_string(),
                        actual: fingerprint.to_string(),
                    });
                    continue;
                }
            }

            if let Err(e) = install_atomically(&job.dest, &payload).await {
                warn!("Cannot install {}: {}", job.id, e);
                return Err(fail(e.to_string()));
            }

            if let Some(old) = &job.retire {
                retire_previous(old, &job.dest).await;
            }

            debug!("Downloaded: {} -> {:?}", url, job.dest);
            return Ok(Installed {
                path: job.dest.clone(),
                fingerprint,
                url: url.clone(),
            });
        }

        let reason = last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "all candidates failed".into());
        warn!("Giving up on {}: {}", job.id, reason);
        Err(fail(reason))
    }

    /// Fetch under the global concurrency cap.
    async fn fetch(&self, url: &str) -> SyncResult<Vec<u8>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| SyncError::Other(format!("download limiter closed: {e}")))?;
        self.transport.fetch(url).await
    }
}

/// Write `bytes` next to `dest`, then rename over it. `dest` is never partial.
pub async fn install_atomically(dest: &Path, bytes: &[u8]) -> SyncResult<()> {
    let parent = dest
        .parent()
        .ok_or_else(|| SyncError::Other(format!("{:?} has no parent directory", dest)))?;
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| SyncError::io(parent, e))?;

    let temp = temp_sibling(dest);
    let written = async {
        let mut file = tokio::fs::File::create(&temp)
            .await
            .map_err(|e| SyncError::io(&temp, e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| SyncError::io(&temp, e))?;
        file.flush().await.map_err(|e| SyncError::io(&temp, e))?;
        file.sync_all().await.map_err(|e| SyncError::io(&temp, e))?;
        // handle dropped before the rename (required on Windows)
        drop(file);
        tokio::fs::rename(&temp, dest)
            .await
            .map_err(|e| SyncError::io(dest, e))
    }
    .await;

    if written.is_err() {
        let _ = tokio::fs::remove_file(&temp).await;
    }
    written
}

/// Hidden temp path in the same directory, so the final rename stays on one filesystem.
pub fn temp_sibling(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    dest.with_file_name(format!(".{}.{}.part", name, Uuid::new_v4()))
}

async fn retire_previous(old: &Path, fresh: &Path) {
    if old == fresh {
        return;
    }
    match tokio::fs::remove_file(old).await {
        Ok(()) => info!("Deleting {:?}", old),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove superseded file {:?}: {}", old, e),
    }
}

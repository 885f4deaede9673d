use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::fingerprint::Fingerprint;
use crate::core::error::SyncError;

/// One artifact to check: where it should be and what it should hash to.
///
/// `expected == None` means nothing local can satisfy it (never installed,
/// or the wanted version changed) and it is stale without reading the disk.
/// `payload` rides along untouched so stale entries reach the downloader with
/// their source metadata.
#[derive(Debug, Clone)]
pub struct VerifyTarget<T> {
    pub id: String,
    pub expected: Option<Fingerprint>,
    pub path: PathBuf,
    pub payload: T,
}

/// Why a target needs fetching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    Untracked,
    Missing,
    Mismatch { actual: Fingerprint },
    Unreadable(String),
}

#[derive(Debug, Clone)]
pub struct Stale<T> {
    pub target: VerifyTarget<T>,
    pub reason: StaleReason,
}

#[derive(Debug)]
pub struct Verification<T> {
    pub satisfied: Vec<VerifyTarget<T>>,
    pub stale: Vec<Stale<T>>,
}

/// Classifies artifacts as satisfied or stale by comparing fingerprints.
///
/// Pure read: never writes, never deletes.
#[derive(Debug, Clone)]
pub struct ContentVerifier {
    concurrency: usize,
    /// Fingerprints already computed this run (e.g. the mods scan), by path.
    known: Arc<HashMap<PathBuf, Fingerprint>>,
}

impl ContentVerifier {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            known: Arc::new(HashMap::new()),
        }
    }

    /// Reuse fingerprints computed earlier in the same run.
    pub fn with_known(mut self, known: HashMap<PathBuf, Fingerprint>) -> Self {
        self.known = Arc::new(known);
        self
    }

    /// Check every target concurrently and partition the batch.
    ///
    /// Output order follows input order within each partition.
    pub async fn verify<T>(&self, batch: Vec<VerifyTarget<T>>) -> Verification<T> {
        let total = batch.len();
        let mut results: Vec<(usize, VerifyTarget<T>, Option<StaleReason>)> =
            stream::iter(batch.into_iter().enumerate())
                .map(|(idx, target)| async move {
                    let verdict = self.check(&target).await;
                    (idx, target, verdict)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;
        results.sort_by_key(|(idx, _, _)| *idx);

        let mut satisfied = Vec::new();
        let mut stale = Vec::new();
        for (_, target, verdict) in results {
            match verdict {
                None => satisfied.push(target),
                Some(reason) => {
                    debug!("{} is stale: {:?}", target.id, reason);
                    stale.push(Stale { target, reason });
                }
            }
        }

        info!(
            "Verified {} artifacts: {} up to date, {} stale",
            total,
            satisfied.len(),
            stale.len()
        );
        Verification { satisfied, stale }
    }

    async fn check<T>(&self, target: &VerifyTarget<T>) -> Option<StaleReason> {
        let expected = match &target.expected {
            Some(e) => e,
            None => return Some(StaleReason::Untracked),
        };

        let actual = match self.known.get(&target.path) {
            Some(fp) => fp.clone(),
            None => match Fingerprint::of_file(&target.path).await {
                Ok(fp) => fp,
                Err(SyncError::Io { ref source, .. })
                    if source.kind() == std::io::ErrorKind::NotFound =>
                {
                    return Some(StaleReason::Missing);
                }
                Err(e) => {
                    warn!("Cannot hash {:?}: {}", target.path, e);
                    return Some(StaleReason::Unreadable(e.to_string()));
                }
            },
        };

        if &actual == expected {
            None
        } else {
            Some(StaleReason::Mismatch { actual })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: &str, expected: Option<Fingerprint>, path: PathBuf) -> VerifyTarget<u32> {
        VerifyTarget {
            id: id.into(),
            expected,
            path,
            payload: 7,
        }
    }

    #[tokio::test]
    async fn partitions_by_fingerprint() {
        let temp = tempfile::tempdir().unwrap();
        let good = temp.path().join("good.png");
        let corrupt = temp.path().join("corrupt.png");
        std::fs::write(&good, b"good").unwrap();
        std::fs::write(&corrupt, b"garbage").unwrap();

        let verifier = ContentVerifier::new(4);
        let result = verifier
            .verify(vec![
                target("good", Some(Fingerprint::of_bytes(b"good")), good),
                target("corrupt", Some(Fingerprint::of_bytes(b"fine")), corrupt),
                target(
                    "absent",
                    Some(Fingerprint::of_bytes(b"x")),
                    temp.path().join("absent.png"),
                ),
                target("untracked", None, temp.path().join("good.png")),
            ])
            .await;

        let satisfied: Vec<_> = result.satisfied.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(satisfied, vec!["good"]);

        let stale: Vec<_> = result
            .stale
            .iter()
            .map(|s| (s.target.id.as_str(), s.reason.clone()))
            .collect();
        assert_eq!(stale[0].0, "corrupt");
        assert_eq!(
            stale[0].1,
            StaleReason::Mismatch {
                actual: Fingerprint::of_bytes(b"garbage")
            }
        );
        assert_eq!(stale[1], ("absent", StaleReason::Missing));
        assert_eq!(stale[2], ("untracked", StaleReason::Untracked));
        assert!(result.stale.iter().all(|s| s.target.payload == 7));
    }

    #[tokio::test]
    async fn known_fingerprints_skip_disk_reads() {
        let path = PathBuf::from("/not/on/disk/mod.jar");
        let fp = Fingerprint::of_bytes(b"cached");
        let verifier =
            ContentVerifier::new(1).with_known(HashMap::from([(path.clone(), fp.clone())]));

        let result = verifier.verify(vec![target("cached", Some(fp), path)]).await;
        assert_eq!(result.satisfied.len(), 1);
        assert!(result.stale.is_empty());
    }
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use super::report::{ArtifactOutcome, ResolvedArtifact, RunReport};
use crate::core::assets::{AssetEntry, AssetIndex, AssetTree, OverrideSet};
use crate::core::catalog::Catalog;
use crate::core::downloader::{
    ArtifactKind, DownloadFailure, DownloadJob, DownloadResult, Downloader, HttpTransport,
    Transport,
};
use crate::core::error::SyncResult;
use crate::core::index::{IndexRecord, IndexStore, InstalledMod, LocalInventory};
use crate::core::instance::InstanceTarget;
use crate::core::patcher::ArchivePatcher;
use crate::core::resolver::{PackResolver, Resolution};
use crate::core::source::{DownloadPlan, SourceContext, SourceDescriptor};
use crate::core::state::SyncSettings;
use crate::core::verify::{ContentVerifier, Fingerprint, Verification, VerifyTarget};

/// A resolved mod narrowed to the instance's game version and loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedMod {
    pub id: String,
    pub version: String,
    pub source: SourceDescriptor,
}

/// Per-mod data carried through verification into the download stage.
#[derive(Debug, Clone)]
struct ModTask {
    version: String,
    plan: Result<DownloadPlan, String>,
    /// Correlated file of a previous install.
    previous: Option<PathBuf>,
}

/// Runs one synchronization of an instance directory.
///
/// Everything a run builds (catalog snapshot, inventory, source context) is
/// created inside [`SyncEngine::run`] and dropped with it; only the manifest
/// outlives the run.
pub struct SyncEngine {
    settings: SyncSettings,
    root: PathBuf,
    transport: Arc<dyn Transport>,
}

impl SyncEngine {
    pub fn new(settings: SyncSettings, root: impl Into<PathBuf>, transport: Arc<dyn Transport>) -> Self {
        Self {
            settings,
            root: root.into(),
            transport,
        }
    }

    /// Engine backed by the real HTTP transport.
    pub fn with_http(settings: SyncSettings, root: impl Into<PathBuf>) -> SyncResult<Self> {
        let transport = HttpTransport::new(settings.request_timeout())?;
        Ok(Self::new(settings, root, Arc::new(transport)))
    }

    /// Full pipeline: pre-flight, verify, download, overrides, patch, manifest.
    ///
    /// Fatal errors are the pre-flight ones (nothing has been written yet) and
    /// a failed archive patch (the manifest is then left as it was).
    /// Per-artifact download failures end up in the report.
    #[instrument(skip(self), fields(pack = %self.settings.pack_id, root = ?self.root))]
    pub async fn run(&self) -> SyncResult<RunReport> {
        let started_at = Utc::now();
        let settings = &self.settings;
        let target = settings.target()?;
        let layout = settings.layout(&self.root);
        let concurrency = settings.concurrency();

        // ── Pre-flight ──────────────────────────────────
        let catalog = Catalog::fetch(self.transport.as_ref(), &settings.catalog_url).await?;
        let resolution = PackResolver::new(&catalog).resolve(&settings.pack_id)?;
        let mut warnings = resolution.validate(&target)?;
        let selected = select_mods(&resolution, &target);

        let indexes = AssetIndex::fetch_all(
            self.transport.as_ref(),
            &settings.asset_metadata_url,
            &resolution.asset_packs,
        )
        .await?;
        let mut tree = AssetTree::merge(indexes);
        let ignored = tree.remove_where(|p| settings.ignored_asset_paths.iter().any(|i| i == p));
        let overrides = OverrideSet::load(&layout.overrides_dir).await?;
        let overridden = tree.remove_where(|p| overrides.contains(p));
        debug!(
            "Asset tree: {} files ({} ignored, {} overridden locally)",
            tree.len(),
            ignored,
            overridden
        );

        // ── Local state ─────────────────────────────────
        layout.prepare().await?;
        let store = IndexStore::new(&layout.index_path);
        let records = store.load().await?;
        let inventory = LocalInventory::scan(&layout.mods_dir, concurrency).await?;
        let installed = inventory.correlate(&records);
        info!(
            "{} manifest records, {} mod files, {} correlated",
            records.len(),
            inventory.len(),
            installed.len()
        );

        let ctx = SourceContext {
            registry_base: settings.registry_maven_url.clone(),
            repositories: catalog.repositories.clone(),
        };

        // ── Verify ──────────────────────────────────────
        let mod_targets = mod_targets(&selected, &installed, &ctx, &layout.mods_dir);
        let asset_targets: Vec<VerifyTarget<AssetEntry>> = tree
            .into_entries()
            .map(|entry| VerifyTarget {
                id: entry.path.clone(),
                expected: Some(entry.fingerprint.clone()),
                path: layout.asset_path(&entry.path),
                payload: entry,
            })
            .collect();

        let verifier = ContentVerifier::new(concurrency).with_known(inventory.known_fingerprints());
        let (mod_check, asset_check) = tokio::join!(
            verifier.verify(mod_targets),
            verifier.verify(asset_targets)
        );

        // ── Download ────────────────────────────────────
        let mut mods: HashMap<String, ResolvedArtifact> = HashMap::new();
        let mod_jobs = Self::mod_jobs(mod_check, &layout.mods_dir, &mut mods);
        let mut assets: Vec<ResolvedArtifact> = Vec::new();
        let asset_jobs = self.asset_jobs(asset_check, &mut assets);

        let downloader = Downloader::new(self.transport.clone(), concurrency);
        let (mod_results, asset_results) = tokio::join!(
            downloader.download_batch(mod_jobs),
            downloader.download_batch(asset_jobs)
        );
        for (job, result) in mod_results {
            let version = versions_of(&selected, &job.id);
            mods.insert(job.id.clone(), finish(job, version, result));
        }
        for (job, result) in asset_results {
            assets.push(finish(job, String::new(), result));
        }
        assets.sort_by(|a, b| a.id.cmp(&b.id));

        let mut mods: Vec<ResolvedArtifact> = selected
            .iter()
            .filter_map(|m| mods.remove(&m.id))
            .collect();

        // ── Overrides ───────────────────────────────────
        for (path, e) in overrides.apply(&layout.assets_dir).await {
            warnings.push(format!("Override {path} not applied: {e}"));
        }

        // ── Core archive ────────────────────────────────
        let patched = self.patch_core(&layout.assets_dir, &mut mods).await?;

        // ── Manifest ────────────────────────────────────
        let next = build_manifest(&mods, &installed, settings.retain_failed_records);
        store.write(&next).await?;

        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            pack_id: settings.pack_id.clone(),
            warnings,
            mods,
            assets,
            patched,
        };
        info!(
            "Sync finished: {} up to date, {} downloaded, {} failed",
            report.verified_count(),
            report.downloaded_count(),
            report.failures().len()
        );
        Ok(report)
    }

    /// Satisfied mods go straight into `done`; stale ones become jobs, or
    /// failures when no download plan exists for them.
    fn mod_jobs(
        check: Verification<ModTask>,
        mods_dir: &Path,
        done: &mut HashMap<String, ResolvedArtifact>,
    ) -> Vec<DownloadJob> {
        for ok in check.satisfied {
            done.insert(
                ok.id.clone(),
                ResolvedArtifact {
                    id: ok.id,
                    kind: ArtifactKind::Mod,
                    urls: ok.payload.plan.map(|p| p.urls).unwrap_or_default(),
                    target: ok.path,
                    fingerprint: ok.expected.clone(),
                    expected: ok.expected,
                    version: ok.payload.version,
                    outcome: ArtifactOutcome::Verified,
                },
            );
        }

        let mut jobs = Vec::new();
        for stale in check.stale {
            let target = stale.target;
            match target.payload.plan {
                Ok(plan) => jobs.push(DownloadJob {
                    id: target.id,
                    kind: ArtifactKind::Mod,
                    dest: mods_dir.join(&plan.file_name),
                    urls: plan.urls,
                    expected: None,
                    retire: target.payload.previous,
                }),
                Err(reason) => {
                    warn!("No download source for {}: {}", target.id, reason);
                    done.insert(
                        target.id.clone(),
                        ResolvedArtifact {
                            id: target.id.clone(),
                            kind: ArtifactKind::Mod,
                            urls: Vec::new(),
                            target: target.path,
                            expected: None,
                            version: target.payload.version,
                            fingerprint: None,
                            outcome: ArtifactOutcome::Failed(DownloadFailure {
                                id: target.id,
                                kind: ArtifactKind::Mod,
                                reason,
                            }),
                        },
                    );
                }
            }
        }
        jobs
    }

    fn asset_jobs(
        &self,
        check: Verification<AssetEntry>,
        done: &mut Vec<ResolvedArtifact>,
    ) -> Vec<DownloadJob> {
        let template = &self.settings.asset_download_url;
        for ok in check.satisfied {
            done.push(ResolvedArtifact {
                id: ok.id,
                kind: ArtifactKind::Asset,
                urls: vec![ok.payload.download_url(template)],
                target: ok.path,
                fingerprint: ok.expected.clone(),
                expected: ok.expected,
                version: String::new(),
                outcome: ArtifactOutcome::Verified,
            });
        }

        check
            .stale
            .into_iter()
            .map(|stale| {
                let target = stale.target;
                DownloadJob {
                    urls: vec![target.payload.download_url(template)],
                    id: target.id,
                    kind: ArtifactKind::Asset,
                    dest: target.path,
                    expected: target.expected,
                    retire: None,
                }
            })
            .collect()
    }

    /// Inject the local patch tree into the core archive once it is present.
    async fn patch_core(
        &self,
        assets_dir: &Path,
        mods: &mut [ResolvedArtifact],
    ) -> SyncResult<Option<Fingerprint>> {
        let settings = &self.settings;
        let Some(core) = mods
            .iter_mut()
            .find(|m| m.id == settings.core_archive_id && m.is_present())
        else {
            debug!("Core archive '{}' not present, skipping patch", settings.core_archive_id);
            return Ok(None);
        };

        let patcher =
            ArchivePatcher::from_dir(&assets_dir.join(&settings.patch_source), &settings.patch_prefix)
                .await?;
        if patcher.is_empty() {
            debug!("Nothing to inject into {}", core.id);
            return Ok(None);
        }

        let fingerprint = patcher.patch(&core.target).await?;
        core.fingerprint = Some(fingerprint.clone());
        Ok(Some(fingerprint))
    }
}

/// Narrow every resolved mod to the entry for the target game version and
/// loader. Mods without such an entry are skipped.
pub fn select_mods(resolution: &Resolution, target: &InstanceTarget) -> Vec<SelectedMod> {
    resolution
        .mods
        .iter()
        .filter_map(|reference| {
            match reference.entry_for(&target.game_version, target.loader) {
                Some(entry) => Some(SelectedMod {
                    id: reference.id.clone(),
                    version: entry.identifier.clone(),
                    source: entry.source.clone(),
                }),
                None => {
                    debug!(
                        "Skipping {}: no entry for {} {}",
                        reference.id, target.game_version, target.loader
                    );
                    None
                }
            }
        })
        .collect()
}

/// A correlated record with the wanted version is checked against its file;
/// anything else is untracked and remembers the old file for retirement.
fn mod_targets(
    selected: &[SelectedMod],
    installed: &HashMap<String, InstalledMod>,
    ctx: &SourceContext,
    mods_dir: &Path,
) -> Vec<VerifyTarget<ModTask>> {
    selected
        .iter()
        .map(|m| {
            let plan = m.source.plan(&m.version, ctx).map_err(|e| e.to_string());
            let previous = installed.get(&m.id);
            let current = previous.filter(|p| p.version == m.version);

            let (expected, path) = match current {
                Some(p) => (Some(p.fingerprint.clone()), p.path.clone()),
                None => {
                    let name = plan
                        .as_ref()
                        .map(|p| p.file_name.clone())
                        .unwrap_or_else(|_| format!("{}.jar", m.id));
                    (None, mods_dir.join(name))
                }
            };

            VerifyTarget {
                id: m.id.clone(),
                expected,
                path,
                payload: ModTask {
                    version: m.version.clone(),
                    plan,
                    previous: previous.map(|p| p.path.clone()),
                },
            }
        })
        .collect()
}

fn versions_of(selected: &[SelectedMod], id: &str) -> String {
    selected
        .iter()
        .find(|m| m.id == id)
        .map(|m| m.version.clone())
        .unwrap_or_default()
}

fn finish(job: DownloadJob, version: String, result: DownloadResult) -> ResolvedArtifact {
    let (target, fingerprint, outcome) = match result {
        Ok(installed) => (
            installed.path,
            Some(installed.fingerprint),
            ArtifactOutcome::Downloaded,
        ),
        Err(failure) => (job.dest, None, ArtifactOutcome::Failed(failure)),
    };
    ResolvedArtifact {
        id: job.id,
        kind: job.kind,
        urls: job.urls,
        target,
        expected: job.expected,
        version,
        fingerprint,
        outcome,
    }
}

/// One record per mod that ended present on disk, in resolution order.
///
/// A failed mod is dropped unless `retain_failed` is set and its previous
/// install is still correlated, in which case the old record is kept.
pub fn build_manifest(
    mods: &[ResolvedArtifact],
    installed: &HashMap<String, InstalledMod>,
    retain_failed: bool,
) -> Vec<IndexRecord> {
    mods.iter()
        .filter_map(|m| match (&m.outcome, &m.fingerprint) {
            (ArtifactOutcome::Verified | ArtifactOutcome::Downloaded, Some(fp)) => {
                Some(IndexRecord {
                    id: m.id.clone(),
                    fingerprint: fp.clone(),
                    version: m.version.clone(),
                })
            }
            (ArtifactOutcome::Failed(_), _) if retain_failed => {
                installed.get(&m.id).map(|prev| IndexRecord {
                    id: prev.id.clone(),
                    fingerprint: prev.fingerprint.clone(),
                    version: prev.version.clone(),
                })
            }
            _ => None,
        })
        .collect()
}

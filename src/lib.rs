pub mod core;

use std::path::Path;
use std::process::ExitCode;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

pub use crate::core::error::{SyncError, SyncResult};
pub use crate::core::state::SyncSettings;
pub use crate::core::sync::{ArtifactOutcome, ResolvedArtifact, RunReport, SyncEngine};

/// Structured logging, `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,packsync_lib=debug")),
        )
        .try_init();
}

/// Load settings from `root`, run one sync there and print a summary.
pub async fn run(root: &Path) -> ExitCode {
    init_tracing();
    info!("packsync {} starting in {:?}", env!("CARGO_PKG_VERSION"), root);

    let result = async {
        let settings = SyncSettings::load_from_dir(root)?;
        SyncEngine::with_http(settings, root)?.run().await
    }
    .await;

    match result {
        Ok(report) => {
            print_summary(&report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            if e.is_preflight() {
                error!("Pre-flight check failed, nothing was changed: {}", e);
            } else {
                error!("Sync aborted: {}", e);
            }
            ExitCode::FAILURE
        }
    }
}

fn print_summary(report: &RunReport) {
    for warning in &report.warnings {
        warn!("{}", warning);
    }
    for failure in report.failures() {
        warn!("Failed {:?} {}: {}", failure.kind, failure.id, failure.reason);
    }
    if let Some(fp) = &report.patched {
        info!("Core archive patched ({})", fp);
    }

    println!(
        "{}: {} mods, {} assets | {} up to date, {} downloaded, {} failed ({} ms)",
        report.pack_id,
        report.mods.len(),
        report.assets.len(),
        report.verified_count(),
        report.downloaded_count(),
        report.failures().len(),
        report.duration().num_milliseconds()
    );
}

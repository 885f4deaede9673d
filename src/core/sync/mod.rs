mod report;
mod run;

pub use report::{ArtifactOutcome, ResolvedArtifact, RunReport};
pub use run::{build_manifest, select_mods, SelectedMod, SyncEngine};

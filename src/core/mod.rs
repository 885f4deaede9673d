// ─── packsync core ───
// Keeps an instance's mods and assets in line with a remote pack catalog.
//
// Architecture:
//   core/
//     instance/   — Install layout, loader type, target game version
//     source/     — Registry/maven source descriptors + URL candidates
//     catalog/    — Pack catalog wire model + typed parse
//     resolver/   — Pack inheritance walk + pre-flight validation
//     verify/     — MD5 fingerprints + satisfied/stale classification
//     downloader/ — Transport trait, capped concurrent downloads, atomic installs
//     assets/     — Asset metadata, merged asset tree, local overrides
//     patcher/    — Core archive rewrite with injected entries
//     index/      — Persisted manifest + local mods inventory
//     state/      — Settings
//     sync/       — Per-run pipeline + report

pub mod assets;
pub mod catalog;
pub mod downloader;
pub mod error;
pub mod http;
pub mod index;
pub mod instance;
pub mod patcher;
pub mod resolver;
pub mod source;
pub mod state;
pub mod sync;
pub mod verify;

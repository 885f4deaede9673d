use std::collections::{BTreeMap, HashMap};

use tracing::{info, warn};

use super::wire::{RawCatalog, RawCompat, RawMod, RawPack};
use crate::core::downloader::Transport;
use crate::core::error::{SyncError, SyncResult};
use crate::core::instance::LoaderType;
use crate::core::source::SourceDescriptor;

/// One loader's entry for one game version: where to get the jar and which
/// version identifier to ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatEntry {
    pub source: SourceDescriptor,
    pub identifier: String,
}

/// A mod required by a pack, with its per-game-version compatibility table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModReference {
    pub id: String,
    /// game version → loader → entry
    pub compatibility: BTreeMap<String, BTreeMap<LoaderType, CompatEntry>>,
}

impl ModReference {
    /// Entry for the given game version and loader, if declared.
    pub fn entry_for(&self, game_version: &str, loader: LoaderType) -> Option<&CompatEntry> {
        self.compatibility.get(game_version)?.get(&loader)
    }

    /// Game versions this declaration claims compatibility with.
    pub fn game_versions(&self) -> impl Iterator<Item = &String> {
        self.compatibility.keys()
    }
}

/// Loader a pack asks for by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderRequirement {
    pub loader: LoaderType,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackDefinition {
    pub id: String,
    pub display_name: String,
    pub mods: Vec<ModReference>,
    pub assets: Vec<String>,
    pub inherits_from: Vec<String>,
    pub default_loader: Option<LoaderRequirement>,
}

/// Immutable snapshot of the remote catalog for one run.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub packs: HashMap<String, PackDefinition>,
    /// repository reference name → base URL
    pub repositories: HashMap<String, String>,
}

impl Catalog {
    /// Fetch and parse the catalog. Never cached across runs.
    pub async fn fetch(transport: &dyn Transport, url: &str) -> SyncResult<Self> {
        info!("Fetching pack catalog from {}", url);
        let body = transport.fetch(url).await?;
        let catalog = Self::from_slice(&body)?;
        info!(
            "Loaded {} packs and {} repositories",
            catalog.packs.len(),
            catalog.repositories.len()
        );
        Ok(catalog)
    }

    pub fn from_slice(bytes: &[u8]) -> SyncResult<Self> {
        let raw: RawCatalog = serde_json::from_slice(bytes)
            .map_err(|e| SyncError::MalformedCatalog(e.to_string()))?;
        Self::from_raw(raw)
    }

    pub fn from_json(json: &str) -> SyncResult<Self> {
        Self::from_slice(json.as_bytes())
    }

    fn from_raw(raw: RawCatalog) -> SyncResult<Self> {
        let packs = raw
            .packs
            .into_iter()
            .map(|(id, pack)| {
                let parsed = parse_pack(&id, pack)?;
                Ok((id, parsed))
            })
            .collect::<SyncResult<HashMap<_, _>>>()?;

        Ok(Self {
            packs,
            repositories: raw.repositories,
        })
    }

    pub fn pack(&self, id: &str) -> Option<&PackDefinition> {
        self.packs.get(id)
    }
}

fn parse_pack(id: &str, raw: RawPack) -> SyncResult<PackDefinition> {
    let mods = raw
        .mods
        .into_iter()
        .map(|m| parse_mod(id, m))
        .collect::<SyncResult<Vec<_>>>()?;

    let default_loader = match raw.loader_policy.and_then(|p| p.default) {
        Some(l) => Some(LoaderRequirement {
            loader: l.loader.parse().map_err(|_| {
                SyncError::MalformedCatalog(format!(
                    "pack '{id}' declares unknown default loader '{}'",
                    l.loader
                ))
            })?,
            version: l.version,
        }),
        None => None,
    };

    Ok(PackDefinition {
        id: id.to_string(),
        display_name: raw.display_name.unwrap_or_else(|| id.to_string()),
        mods,
        assets: raw.assets,
        inherits_from: raw.inherits_from,
        default_loader,
    })
}

fn parse_mod(pack_id: &str, raw: RawMod) -> SyncResult<ModReference> {
    if raw.id.trim().is_empty() {
        return Err(SyncError::MalformedCatalog(format!(
            "pack '{pack_id}' contains a mod without id"
        )));
    }

    let fallback = raw
        .source
        .map(|value| parse_source(&raw.id, value))
        .transpose()?;

    let mut compatibility = BTreeMap::new();
    for (game_version, loaders) in raw.compatibility {
        let mut entries = BTreeMap::new();
        for (loader_name, compat) in loaders {
            let loader = match loader_name.parse::<LoaderType>() {
                Ok(l) => l,
                Err(_) => {
                    warn!(
                        "Mod '{}' declares unknown loader '{}' for {} (ignored)",
                        raw.id, loader_name, game_version
                    );
                    continue;
                }
            };
            let entry = parse_compat(&raw.id, &game_version, compat, fallback.as_ref())?;
            entries.insert(loader, entry);
        }
        compatibility.insert(game_version, entries);
    }

    Ok(ModReference {
        id: raw.id,
        compatibility,
    })
}

fn parse_compat(
    mod_id: &str,
    game_version: &str,
    raw: RawCompat,
    fallback: Option<&SourceDescriptor>,
) -> SyncResult<CompatEntry> {
    let source = match raw.source {
        Some(value) => parse_source(mod_id, value)?,
        None => fallback.cloned().ok_or_else(|| {
            SyncError::MalformedCatalog(format!(
                "mod '{mod_id}' has no source for game version {game_version}"
            ))
        })?,
    };

    if raw.identifier.trim().is_empty() {
        return Err(SyncError::MalformedCatalog(format!(
            "mod '{mod_id}' has an empty version identifier for {game_version}"
        )));
    }

    Ok(CompatEntry {
        source,
        identifier: raw.identifier,
    })
}

fn parse_source(mod_id: &str, value: serde_json::Value) -> SyncResult<SourceDescriptor> {
    serde_json::from_value(value)
        .map_err(|e| SyncError::MalformedCatalog(format!("mod '{mod_id}' has a bad source: {e}")))
}

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, warn};

use crate::core::catalog::{Catalog, LoaderRequirement, ModReference};
use crate::core::error::{SyncError, SyncResult};
use crate::core::instance::InstanceTarget;

/// Effective requirements of a pack after walking its inheritance graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub root: String,
    /// Packs in visit order (root first).
    pub visited: Vec<String>,
    /// Deduplicated by id, first-seen wins.
    pub mods: Vec<ModReference>,
    /// Deduplicated asset-pack ids in first-seen order.
    pub asset_packs: Vec<String>,
    pub loader: Option<LoaderRequirement>,
    /// Every game version any declaration (kept or discarded) supports.
    pub compatible_versions: BTreeSet<String>,
}

/// Walks pack inheritance depth-first from a root.
///
/// The catalog and the visited set are passed explicitly; the resolver keeps
/// no state between calls.
pub struct PackResolver<'a> {
    catalog: &'a Catalog,
}

impl<'a> PackResolver<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Resolve `root` into its deduplicated mod and asset references.
    ///
    /// Each pack is visited at most once, so cyclic inheritance terminates.
    /// A pack's own references are accumulated before those of the packs it
    /// inherits from, in declaration order.
    pub fn resolve(&self, root: &str) -> SyncResult<Resolution> {
        if self.catalog.pack(root).is_none() {
            return Err(SyncError::UnknownPack(root.to_string()));
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut order = Vec::new();
        let mut stack: Vec<&str> = vec![root];

        let mut mods: Vec<ModReference> = Vec::new();
        let mut mod_index: HashMap<String, usize> = HashMap::new();
        let mut asset_packs: Vec<String> = Vec::new();
        let mut seen_assets: HashSet<String> = HashSet::new();
        let mut loader: Option<LoaderRequirement> = None;
        let mut compatible_versions = BTreeSet::new();

        while let Some(pack_id) = stack.pop() {
            if !visited.insert(pack_id) {
                continue;
            }
            let pack = self
                .catalog
                .pack(pack_id)
                .ok_or_else(|| SyncError::UnknownPack(pack_id.to_string()))?;
            order.push(pack.id.clone());

            if loader.is_none() {
                loader = pack.default_loader.clone();
            }

            for reference in &pack.mods {
                compatible_versions.extend(reference.game_versions().cloned());
                if let Some(&kept) = mod_index.get(&reference.id) {
                    debug!(
                        "Mod '{}' from pack '{}' shadowed by earlier declaration #{}",
                        reference.id, pack.id, kept
                    );
                    continue;
                }
                mod_index.insert(reference.id.clone(), mods.len());
                mods.push(reference.clone());
            }

            for asset in &pack.assets {
                if seen_assets.insert(asset.clone()) {
                    asset_packs.push(asset.clone());
                }
            }

            // Reverse so the first declared parent is popped first.
            for parent in pack.inherits_from.iter().rev() {
                if !visited.contains(parent.as_str()) {
                    stack.push(parent.as_str());
                }
            }
        }

        debug!(
            "Resolved pack '{}': {} packs, {} mods, {} asset packs",
            root,
            order.len(),
            mods.len(),
            asset_packs.len()
        );

        Ok(Resolution {
            root: root.to_string(),
            visited: order,
            mods,
            asset_packs,
            loader,
            compatible_versions,
        })
    }
}

impl Resolution {
    /// Pre-flight compatibility check against the local instance.
    ///
    /// Returns non-fatal warnings (loader version drift).
    pub fn validate(&self, target: &InstanceTarget) -> SyncResult<Vec<String>> {
        if !self.compatible_versions.contains(&target.game_version) {
            return Err(SyncError::PackIncompatible {
                pack: self.root.clone(),
                game_version: target.game_version.clone(),
                available: self.compatible_versions.iter().cloned().collect(),
            });
        }

        let mut warnings = Vec::new();
        if let Some(required) = &self.loader {
            if required.loader != target.loader {
                return Err(SyncError::LoaderMismatch {
                    required: required.loader.to_string(),
                    target: target.loader.to_string(),
                });
            }
            if let (Some(wanted), Some(actual)) = (&required.version, &target.loader_version) {
                if wanted != actual {
                    let message = format!(
                        "Pack '{}' expects {} {} but the instance runs {}",
                        self.root, required.loader, wanted, actual
                    );
                    warn!("{}", message);
                    warnings.push(message);
                }
            }
        }

        Ok(warnings)
    }
}

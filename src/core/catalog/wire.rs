// ─── Catalog wire format ───
// Loosely typed mirror of the catalog JSON. Only `model.rs` looks at these;
// everything past the parse boundary uses the typed structs.

use std::collections::HashMap;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(super) struct RawCatalog {
    pub packs: HashMap<String, RawPack>,
    #[serde(default)]
    pub repositories: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RawPack {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub mods: Vec<RawMod>,
    #[serde(default)]
    pub assets: Vec<String>,
    #[serde(default)]
    pub inherits_from: Vec<String>,
    #[serde(default)]
    pub loader_policy: Option<RawLoaderPolicy>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawLoaderPolicy {
    #[serde(default)]
    pub default: Option<RawLoader>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawLoader {
    pub loader: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawMod {
    pub id: String,
    /// Kept untyped so a bad source can be reported with the owning mod id.
    #[serde(default)]
    pub source: Option<serde_json::Value>,
    /// game version → loader name → entry
    #[serde(default)]
    pub compatibility: HashMap<String, HashMap<String, RawCompat>>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawCompat {
    pub identifier: String,
    #[serde(default)]
    pub source: Option<serde_json::Value>,
}

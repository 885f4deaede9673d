mod asset_index;
mod overrides;

pub use asset_index::{is_safe_relative, AssetEntry, AssetIndex, AssetObject, AssetTree};
pub use overrides::OverrideSet;
pub(crate) use overrides::relative_key;

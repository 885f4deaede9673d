mod settings;

pub use settings::{SyncSettings, SETTINGS_FILE};

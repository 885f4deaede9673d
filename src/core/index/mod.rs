mod inventory;
mod store;

pub use inventory::{InstalledMod, LocalInventory};
pub use store::{IndexRecord, IndexStore};

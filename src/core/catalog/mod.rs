mod model;
mod wire;

pub use model::{Catalog, CompatEntry, LoaderRequirement, ModReference, PackDefinition};

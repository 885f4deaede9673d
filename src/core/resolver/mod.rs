mod pack_resolver;

pub use pack_resolver::{PackResolver, Resolution};

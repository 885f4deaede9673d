pub mod model;

pub use model::{InstanceLayout, InstanceTarget, LoaderType};

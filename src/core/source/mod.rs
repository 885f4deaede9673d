mod descriptor;
mod maven;

pub use descriptor::{DownloadPlan, SourceContext, SourceDescriptor};
pub use maven::MavenCoordinate;

/// Base of the registry's maven mirror.
pub const REGISTRY_MAVEN: &str = "https://api.modrinth.com/maven";

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::maven::MavenCoordinate;
use crate::core::error::{SyncError, SyncResult};

/// Group under which the registry publishes its maven mirror.
const REGISTRY_MAVEN_GROUP: &str = "maven.modrinth";

/// Where an artifact comes from. Exactly one variant per reference; the
/// variant decides how download candidates are built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SourceDescriptor {
    /// Registry project, addressable by id and by slug.
    #[serde(rename = "modrinth", rename_all = "camelCase")]
    Registry {
        project_id: String,
        project_slug: String,
    },
    /// Jar in a named maven repository.
    #[serde(rename = "maven", rename_all = "camelCase")]
    Maven {
        repository_ref: String,
        group_id: String,
        artifact_id: String,
    },
}

/// Lookup tables needed to turn a descriptor into URLs. Built once per run.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub registry_base: String,
    pub repositories: HashMap<String, String>,
}

/// Ordered download candidates plus the file name to install under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPlan {
    pub urls: Vec<String>,
    pub file_name: String,
}

impl SourceDescriptor {
    /// Build the ordered candidate list for `version`.
    ///
    /// Registry sources yield the id-keyed path, then the slug-keyed path.
    /// Maven sources yield exactly one URL under their named repository.
    pub fn plan(&self, version: &str, ctx: &SourceContext) -> SyncResult<DownloadPlan> {
        match self {
            SourceDescriptor::Registry {
                project_id,
                project_slug,
            } => {
                let by_id = MavenCoordinate::new(REGISTRY_MAVEN_GROUP, project_id, version);
                let by_slug = MavenCoordinate::new(REGISTRY_MAVEN_GROUP, project_slug, version);
                Ok(DownloadPlan {
                    urls: vec![by_id.url(&ctx.registry_base), by_slug.url(&ctx.registry_base)],
                    file_name: by_slug.filename(),
                })
            }
            SourceDescriptor::Maven {
                repository_ref,
                group_id,
                artifact_id,
            } => {
                let base = ctx.repositories.get(repository_ref).ok_or_else(|| {
                    SyncError::Other(format!("unknown maven repository '{repository_ref}'"))
                })?;
                let coord = MavenCoordinate::new(group_id, artifact_id, version);
                Ok(DownloadPlan {
                    urls: vec![coord.url(base)],
                    file_name: coord.filename(),
                })
            }
        }
    }
}

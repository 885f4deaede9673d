use std::fmt;

/// A `groupId:artifactId:version` coordinate of a jar in a maven-layout repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MavenCoordinate {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

impl MavenCoordinate {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
        }
    }

    /// Construct the group path portion (`gg/norisk`).
    pub fn group_path(&self) -> String {
        self.group_id.replace('.', "/")
    }

    /// `artifactId-version.jar`
    pub fn filename(&self) -> String {
        format!("{}-{}.jar", self.artifact_id, self.version)
    }

    /// Full URL of the jar under the given repository base.
    ///
    /// Template:
    /// `<repo>/<group_path>/<artifact_id>/<version>/<filename>`
    pub fn url(&self, repo_base: &str) -> String {
        let base = repo_base.trim_end_matches('/');
        format!(
            "{}/{}/{}/{}/{}",
            base,
            self.group_path(),
            self.artifact_id,
            self.version,
            self.filename()
        )
    }
}

impl fmt::Display for MavenCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_construction_ignores_trailing_slash() {
        let c = MavenCoordinate::new("gg.norisk", "nrc-core", "1.0.42");
        assert_eq!(c.to_string(), "gg.norisk:nrc-core:1.0.42");
        let expected =
            "https://maven.norisk.gg/repository/norisk-production/gg/norisk/nrc-core/1.0.42/nrc-core-1.0.42.jar";
        assert_eq!(
            c.url("https://maven.norisk.gg/repository/norisk-production/"),
            expected
        );
        assert_eq!(
            c.url("https://maven.norisk.gg/repository/norisk-production"),
            expected
        );
    }
}

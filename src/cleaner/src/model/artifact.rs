//! A single registry artifact as reported by the inventory listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registry format string used for container artifacts.
pub const CONTAINER_FORMAT: &str = "docker";
/// `type_display` of a multi-arch container manifest list.
pub const MANIFEST_LIST_TYPE: &str = "manifest/list";
/// `type_display` of a single container image.
pub const IMAGE_TYPE: &str = "image";

/// Free-form tag groups attached to an artifact. Only the `version` group is read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tags {
    #[serde(default)]
    pub version: Option<Vec<String>>,
}

/// One stored unit in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Permanent identifier used for delete calls.
    #[serde(rename = "identifier_perm")]
    pub identifier: String,
    pub name: String,
    pub format: String,
    #[serde(default)]
    pub type_display: Option<String>,
    #[serde(default)]
    pub tags: Option<Tags>,
    #[serde(default)]
    pub status_str: Option<String>,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default)]
    pub status_updated_at: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    /// Package version. For container artifacts this is the content digest.
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
}

/// Closed set of artifact kinds the cleaner distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    ManifestList,
    Image,
    Maven,
    Npm,
    Raw,
    Nuget,
    Unsupported,
}

impl ArtifactKind {
    pub fn classify(format: &str, type_display: Option<&str>) -> Self {
        match (format, type_display) {
            (CONTAINER_FORMAT, Some(MANIFEST_LIST_TYPE)) => ArtifactKind::ManifestList,
            (CONTAINER_FORMAT, Some(IMAGE_TYPE)) => ArtifactKind::Image,
            (CONTAINER_FORMAT, _) => ArtifactKind::Unsupported,
            ("maven", _) => ArtifactKind::Maven,
            ("npm", _) => ArtifactKind::Npm,
            ("raw", _) => ArtifactKind::Raw,
            ("nuget", _) => ArtifactKind::Nuget,
            _ => ArtifactKind::Unsupported,
        }
    }
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        ArtifactKind::classify(&self.format, self.type_display.as_deref())
    }

    /// First entry of the `version` tag group, if any.
    pub fn first_version_tag(&self) -> Option<&str> {
        self.tags
            .as_ref()
            .and_then(|tags| tags.version.as_ref())
            .and_then(|versions| versions.first())
            .map(String::as_str)
    }

    /// Content digest of a container artifact without any `sha256:` prefix.
    pub fn digest(&self) -> Option<&str> {
        self.version
            .as_deref()
            .map(strip_digest_prefix)
            .filter(|digest| !digest.is_empty())
    }
}

/// Strip the `sha256:` algorithm prefix from a digest.
pub fn strip_digest_prefix(digest: &str) -> &str {
    digest.strip_prefix("sha256:").unwrap_or(digest)
}

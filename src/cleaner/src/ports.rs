//! Collaborators the cleaner talks to.
//!
//! The core only depends on these traits. Transport, pagination and
//! authentication live in the implementing crate.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// Address of a manifest list in the container registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManifestCoordinates {
    pub namespace: String,
    pub repository: String,
    pub name: String,
    /// Manifest digest without the `sha256:` prefix.
    pub digest: String,
}

impl ManifestCoordinates {
    /// Registry path of the manifest, relative to the `/v2/` root.
    pub fn path(&self) -> String {
        format!(
            "{}/{}/{}/manifests/sha256:{}",
            self.namespace, self.repository, self.name, self.digest
        )
    }
}

impl fmt::Display for ManifestCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Outcome of a manifest lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestResolution {
    /// Digests of the images the manifest list references.
    Found(Vec<String>),
    /// The manifest no longer exists in the registry.
    NotFound,
}

/// A single delete request that the registry rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFailure {
    /// HTTP status, if the request reached the registry.
    pub status: Option<u16>,
    /// Response body or transport error text.
    pub details: String,
}

impl DeleteFailure {
    pub fn new(status: Option<u16>, details: impl Into<String>) -> Self {
        Self {
            status,
            details: details.into(),
        }
    }
}

impl fmt::Display for DeleteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{status}, {}", self.details),
            None => write!(f, "no status, {}", self.details),
        }
    }
}

impl std::error::Error for DeleteFailure {}

/// Source of the complete, already paginated inventory.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InventoryFetcher: Send + Sync {
    /// Fetch every record matching the server-side `query`.
    async fn fetch_all(&self, query: &str) -> anyhow::Result<Vec<Value>>;
}

/// Resolves which images a manifest list references.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DigestResolver: Send + Sync {
    /// List the digests referenced by a manifest list. A missing manifest is
    /// reported as [`DigestResolution::NotFound`], not as an error.
    async fn list_manifest_digests(
        &self,
        coordinates: &ManifestCoordinates,
    ) -> anyhow::Result<DigestResolution>;
}

/// Deletes one artifact by permanent identifier.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactDeleter: Send + Sync {
    async fn delete(&self, identifier: &str) -> Result<(), DeleteFailure>;
}

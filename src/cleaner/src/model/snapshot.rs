//! Arena holding one point-in-time inventory and its manifest relationships.

use std::collections::HashSet;
use std::fmt;

use serde_json::Value;

use super::artifact::{Artifact, ArtifactKind};
use super::describe::format_bytes;
use super::validate::{ValidationError, validate_record};

/// Index of an artifact inside a [`Snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactId(usize);

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The full inventory of one run.
///
/// Artifacts are never added, removed or reordered after construction. The
/// only mutation is the parent/children adjacency written by the manifest
/// graph builder. Every artifact has at most one parent.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    artifacts: Vec<Artifact>,
    parents: Vec<Option<ArtifactId>>,
    children: Vec<Vec<ArtifactId>>,
}

impl Snapshot {
    /// Build a snapshot from already typed artifacts.
    ///
    /// # Errors
    ///
    /// Returns an error if two artifacts share an identifier.
    pub fn new(artifacts: Vec<Artifact>) -> Result<Self, ValidationError> {
        let mut seen = HashSet::with_capacity(artifacts.len());
        for artifact in &artifacts {
            if !seen.insert(artifact.identifier.as_str()) {
                return Err(ValidationError::DuplicateIdentifier {
                    identifier: artifact.identifier.clone(),
                });
            }
        }

        let len = artifacts.len();
        Ok(Self {
            artifacts,
            parents: vec![None; len],
            children: vec![Vec::new(); len],
        })
    }

    /// Validate raw inventory records and build a snapshot from them.
    ///
    /// # Errors
    ///
    /// Fails on the first record that is missing a required field or cannot
    /// be decoded, and on duplicate identifiers.
    pub fn from_records(records: Vec<Value>) -> Result<Self, ValidationError> {
        let artifacts = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| validate_record(index, record))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(artifacts)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn get(&self, id: ArtifactId) -> &Artifact {
        &self.artifacts[id.0]
    }

    pub fn ids(&self) -> impl Iterator<Item = ArtifactId> + '_ {
        (0..self.artifacts.len()).map(ArtifactId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArtifactId, &Artifact)> {
        self.artifacts
            .iter()
            .enumerate()
            .map(|(index, artifact)| (ArtifactId(index), artifact))
    }

    /// Look up an artifact by its permanent identifier.
    pub fn find(&self, identifier: &str) -> Option<ArtifactId> {
        self.artifacts
            .iter()
            .position(|artifact| artifact.identifier == identifier)
            .map(ArtifactId)
    }

    pub fn parent(&self, id: ArtifactId) -> Option<ArtifactId> {
        self.parents[id.0]
    }

    pub fn children(&self, id: ArtifactId) -> &[ArtifactId] {
        &self.children[id.0]
    }

    /// Drop every parent/child link.
    pub(crate) fn clear_links(&mut self) {
        self.parents.iter_mut().for_each(|parent| *parent = None);
        self.children.iter_mut().for_each(Vec::clear);
    }

    /// Attach `child` to `parent`. Returns `false` without changing anything
    /// when the child already belongs to a manifest list or would be its own
    /// parent.
    pub(crate) fn link(&mut self, parent: ArtifactId, child: ArtifactId) -> bool {
        if parent == child || self.parents[child.0].is_some() {
            return false;
        }
        self.parents[child.0] = Some(parent);
        self.children[parent.0].push(child);
        true
    }

    /// Whether the cleaner may consider this artifact for deletion at all.
    ///
    /// Manifest lists are always supported. Container images only when they
    /// belong to no manifest list and `process_images_without_parent` is set;
    /// images inside a manifest list are removed through their parent.
    pub fn is_supported(&self, id: ArtifactId, process_images_without_parent: bool) -> bool {
        match self.get(id).kind() {
            ArtifactKind::ManifestList => true,
            ArtifactKind::Image => self.parent(id).is_none() && process_images_without_parent,
            ArtifactKind::Maven | ArtifactKind::Npm | ArtifactKind::Raw | ArtifactKind::Nuget => {
                true
            }
            ArtifactKind::Unsupported => false,
        }
    }

    /// Format-dependent version tag. Empty values count as absent.
    pub fn version_tag(&self, id: ArtifactId) -> Option<&str> {
        let artifact = self.get(id);
        let tag = match artifact.kind() {
            ArtifactKind::ManifestList | ArtifactKind::Raw => artifact.first_version_tag(),
            ArtifactKind::Image if self.parent(id).is_none() => artifact.first_version_tag(),
            ArtifactKind::Image => None,
            ArtifactKind::Maven => artifact.summary.as_deref(),
            ArtifactKind::Npm | ArtifactKind::Nuget => artifact.version.as_deref(),
            ArtifactKind::Unsupported => None,
        };
        tag.filter(|tag| !tag.is_empty())
    }

    /// One-line rendering used in log output.
    pub fn describe(&self, id: ArtifactId) -> String {
        let artifact = self.get(id);
        format!(
            "[{}|{}][{}] {}:{} (uploaded: {})({})",
            artifact.format,
            artifact.type_display.as_deref().unwrap_or(""),
            artifact.identifier,
            artifact.name,
            self.version_tag(id).unwrap_or("?"),
            artifact.uploaded_at.format("%Y-%m-%d %H:%M:%S UTC"),
            format_bytes(artifact.size),
        )
    }

    /// The artifact followed by all of its descendants, depth first.
    pub fn with_descendants(&self, id: ArtifactId) -> Vec<ArtifactId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev());
        }
        out
    }

    /// Total size of the given artifacts and all their descendants. An
    /// artifact reachable more than once is counted once.
    pub fn total_size(&self, ids: &[ArtifactId]) -> u64 {
        let mut seen = HashSet::new();
        ids.iter()
            .flat_map(|&id| self.with_descendants(id))
            .filter(|id| seen.insert(*id))
            .map(|id| self.get(id).size)
            .sum()
    }

    /// Report lines for a set of artifacts, children indented below their parent.
    pub fn listing(&self, ids: &[ArtifactId]) -> Vec<String> {
        let mut lines = Vec::new();
        for &id in ids {
            lines.push(format!("\t{}", self.describe(id)));
            for &child in self.children(id) {
                lines.push(format!("\t\t{}", self.describe(child)));
            }
        }
        lines
    }
}

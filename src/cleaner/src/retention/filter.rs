//! Decides which artifacts of a snapshot are eligible for deletion.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::model::{ArtifactId, Snapshot};
use crate::retention::policy::RetentionPolicy;

/// Why an artifact was kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exclusion {
    Unsupported,
    NameMismatch,
    FormatMismatch,
    VersionTagMismatch,
    MissingVersionTag,
    TooYoungWithTag,
    TooYoungWithoutTag,
    Latest,
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Exclusion::Unsupported => "unsupported",
            Exclusion::NameMismatch => "name regex does not match",
            Exclusion::FormatMismatch => "format regex does not match",
            Exclusion::VersionTagMismatch => "has tag but tag regex does not match",
            Exclusion::MissingVersionTag => "no tag and missing tags not allowed",
            Exclusion::TooYoungWithTag => "too young with tag",
            Exclusion::TooYoungWithoutTag => "too young without tag",
            Exclusion::Latest => "latest version of its name",
        };
        f.write_str(reason)
    }
}

/// Result of filtering a snapshot.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    /// Artifacts to delete, in snapshot order.
    pub eligible: Vec<ArtifactId>,
    /// Artifacts kept, with the first rule that excluded them.
    pub excluded: Vec<(ArtifactId, Exclusion)>,
}

impl FilterOutcome {
    pub fn exclusion_counts(&self) -> HashMap<Exclusion, usize> {
        let mut counts = HashMap::new();
        for (_, reason) in &self.excluded {
            *counts.entry(*reason).or_insert(0) += 1;
        }
        counts
    }
}

/// Applies a [`RetentionPolicy`] to a graph-enriched snapshot.
#[derive(Debug, Clone)]
pub struct RetentionFilter {
    policy: RetentionPolicy,
}

impl RetentionFilter {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self { policy }
    }

    /// Evaluate every artifact in the snapshot against the policy at `now`.
    pub fn evaluate(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> FilterOutcome {
        let latest = latest_upload_by_name(snapshot);
        let mut outcome = FilterOutcome::default();

        for id in snapshot.ids() {
            match self.check(snapshot, id, now, &latest) {
                Ok(()) => outcome.eligible.push(id),
                Err(reason) => {
                    tracing::info!(
                        reason = %reason,
                        artifact = %snapshot.describe(id),
                        "Filtered out"
                    );
                    outcome.excluded.push((id, reason));
                }
            }
        }

        outcome
    }

    /// Run the rules in order and stop at the first one that fails.
    fn check(
        &self,
        snapshot: &Snapshot,
        id: ArtifactId,
        now: DateTime<Utc>,
        latest: &HashMap<&str, DateTime<Utc>>,
    ) -> Result<(), Exclusion> {
        let policy = &self.policy;
        let artifact = snapshot.get(id);

        if !snapshot.is_supported(id, policy.process_images_without_parent) {
            return Err(Exclusion::Unsupported);
        }
        if !policy.name.is_match(&artifact.name) {
            return Err(Exclusion::NameMismatch);
        }
        if !policy.format.is_match(&artifact.format) {
            return Err(Exclusion::FormatMismatch);
        }

        let tag = snapshot.version_tag(id);
        match tag {
            Some(tag) if !policy.version_tag.is_match(tag) => {
                return Err(Exclusion::VersionTagMismatch);
            }
            None if !policy.allow_missing_version_tag => {
                return Err(Exclusion::MissingVersionTag);
            }
            _ => {}
        }

        let tagged = tag.is_some();
        if now - artifact.uploaded_at < policy.min_age(tagged) {
            return Err(if tagged {
                Exclusion::TooYoungWithTag
            } else {
                Exclusion::TooYoungWithoutTag
            });
        }

        let newest = latest
            .get(artifact.name.as_str())
            .copied()
            .unwrap_or(artifact.uploaded_at);
        if artifact.uploaded_at >= newest {
            return Err(Exclusion::Latest);
        }

        Ok(())
    }
}

/// Most recent upload time per artifact name across the whole snapshot.
fn latest_upload_by_name(snapshot: &Snapshot) -> HashMap<&str, DateTime<Utc>> {
    let mut latest: HashMap<&str, DateTime<Utc>> = HashMap::new();
    for (_, artifact) in snapshot.iter() {
        latest
            .entry(artifact.name.as_str())
            .and_modify(|newest| *newest = (*newest).max(artifact.uploaded_at))
            .or_insert(artifact.uploaded_at);
    }
    latest
}

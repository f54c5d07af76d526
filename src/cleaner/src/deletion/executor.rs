//! Sequential, cascading deletion of eligible artifacts.
//!
//! This module implements best-effort deletion with:
//! - One delete request at a time, in the order received
//! - Cascade from a manifest list to its linked images
//! - Failure aggregation: a failed delete never stops the batch

use std::collections::HashSet;
use std::sync::Arc;

use common::config::CascadeMode;
use thiserror::Error;

use crate::model::{ArtifactId, Snapshot};
use crate::ports::{ArtifactDeleter, DeleteFailure};

/// A delete request the registry rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDeletion {
    pub id: ArtifactId,
    pub identifier: String,
    pub description: String,
    pub failure: DeleteFailure,
}

/// Result of a deletion batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionReport {
    /// Delete requests issued, including cascades.
    pub attempted: usize,
    /// Artifacts deleted, in the order they were deleted.
    pub deleted: Vec<ArtifactId>,
    /// Total bytes of the deleted artifacts.
    pub bytes_reclaimed: u64,
    /// Rejected delete requests, in the order they happened.
    pub failures: Vec<FailedDeletion>,
    /// Children not attempted because their parent could not be deleted.
    pub skipped_children: Vec<ArtifactId>,
}

impl DeletionReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// At least one delete in the batch failed. Every artifact was still attempted.
#[derive(Debug, Error)]
#[error(
    "{} of {} deletes failed, last failure: {} => {}",
    .report.failures.len(),
    .report.attempted,
    .last.description,
    .last.failure
)]
pub struct DeletionError {
    /// The last failure encountered.
    pub last: FailedDeletion,
    /// Full report of the batch.
    pub report: Box<DeletionReport>,
}

/// Deletes artifacts and cascades to manifest list children.
pub struct DeletionExecutor {
    deleter: Arc<dyn ArtifactDeleter>,
    cascade: CascadeMode,
}

impl DeletionExecutor {
    pub fn new(deleter: Arc<dyn ArtifactDeleter>, cascade: CascadeMode) -> Self {
        Self { deleter, cascade }
    }

    /// Delete every artifact in `eligible`, each followed by its children.
    ///
    /// Children are attempted right after their parent. With
    /// [`CascadeMode::Always`] they are attempted even when the parent's
    /// delete failed; with [`CascadeMode::OnParentSuccess`] they are skipped
    /// in that case. No artifact is requested twice within one batch.
    ///
    /// # Errors
    ///
    /// Returns a [`DeletionError`] naming the last failure once all deletes
    /// were attempted, if any of them failed.
    pub async fn execute(
        &self,
        snapshot: &Snapshot,
        eligible: &[ArtifactId],
    ) -> Result<DeletionReport, DeletionError> {
        tracing::info!(
            artifacts = eligible.len(),
            cascade = ?self.cascade,
            "Starting deletion"
        );

        let mut report = DeletionReport::default();
        let mut visited = HashSet::new();

        for &root in eligible {
            let mut stack = vec![root];
            while let Some(id) = stack.pop() {
                if !visited.insert(id) {
                    continue;
                }

                let deleted = self.delete_one(snapshot, id, &mut report).await;

                let children = snapshot.children(id);
                if children.is_empty() {
                    continue;
                }
                if deleted || self.cascade == CascadeMode::Always {
                    stack.extend(children.iter().rev());
                } else {
                    for &child in children {
                        tracing::warn!(
                            artifact = %snapshot.describe(child),
                            "Skipping child of manifest list that could not be deleted"
                        );
                    }
                    report
                        .skipped_children
                        .extend(snapshot.children(id).iter().flat_map(|&child| {
                            snapshot.with_descendants(child)
                        }));
                }
            }
        }

        tracing::info!(
            attempted = report.attempted,
            deleted = report.deleted.len(),
            failed = report.failures.len(),
            skipped = report.skipped_children.len(),
            bytes_reclaimed = report.bytes_reclaimed,
            "Deletion complete"
        );

        match report.failures.last().cloned() {
            None => Ok(report),
            Some(last) => Err(DeletionError {
                last,
                report: Box::new(report),
            }),
        }
    }

    async fn delete_one(
        &self,
        snapshot: &Snapshot,
        id: ArtifactId,
        report: &mut DeletionReport,
    ) -> bool {
        let artifact = snapshot.get(id);
        report.attempted += 1;

        match self.deleter.delete(&artifact.identifier).await {
            Ok(()) => {
                tracing::info!(artifact = %snapshot.describe(id), "Deleted");
                report.deleted.push(id);
                report.bytes_reclaimed += artifact.size;
                true
            }
            Err(failure) => {
                tracing::error!(
                    artifact = %snapshot.describe(id),
                    error = %failure,
                    "Failed to delete"
                );
                report.failures.push(FailedDeletion {
                    id,
                    identifier: artifact.identifier.clone(),
                    description: snapshot.describe(id),
                    failure,
                });
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::snapshot::test_support::*;
    use crate::ports::MockArtifactDeleter;
    use std::sync::Mutex;

    /// Deleter that records every call and fails the configured identifiers.
    #[derive(Default)]
    struct RecordingDeleter {
        failing: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingDeleter {
        fn failing(identifiers: &[&str]) -> Self {
            Self {
                failing: identifiers.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl ArtifactDeleter for RecordingDeleter {
        async fn delete(&self, identifier: &str) -> Result<(), DeleteFailure> {
            self.calls.lock().unwrap().push(identifier.to_string());
            if self.failing.contains(identifier) {
                Err(DeleteFailure::new(Some(500), format!("cannot delete {identifier}")))
            } else {
                Ok(())
            }
        }
    }

    /// A(B, C) manifest list, an independent npm package N.
    fn linked_snapshot() -> Snapshot {
        let mut snapshot = Snapshot::new(vec![
            manifest_list("A", "app", "v1-SNAPSHOT", "aaa", 40),
            image("B", "app", "bbb", 40),
            image("C", "app", "ccc", 40),
            npm("N", "pkgX", "1.0.0", 40),
        ])
        .unwrap();
        let a = snapshot.find("A").unwrap();
        let b = snapshot.find("B").unwrap();
        let c = snapshot.find("C").unwrap();
        snapshot.link(a, b);
        snapshot.link(a, c);
        snapshot
    }

    fn ids(snapshot: &Snapshot, identifiers: &[&str]) -> Vec<ArtifactId> {
        identifiers
            .iter()
            .map(|identifier| snapshot.find(identifier).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_cascades_to_children_in_order() {
        let snapshot = linked_snapshot();
        let deleter = Arc::new(RecordingDeleter::default());
        let executor = DeletionExecutor::new(deleter.clone(), CascadeMode::Always);

        let report = executor
            .execute(&snapshot, &ids(&snapshot, &["A", "N"]))
            .await
            .unwrap();

        assert_eq!(deleter.calls(), vec!["A", "B", "C", "N"]);
        assert_eq!(report.attempted, 4);
        assert_eq!(report.deleted.len(), 4);
        assert_eq!(report.bytes_reclaimed, 400);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_batch() {
        let snapshot = linked_snapshot();
        let deleter = Arc::new(RecordingDeleter::failing(&["B", "N"]));
        let executor = DeletionExecutor::new(deleter.clone(), CascadeMode::Always);

        let err = executor
            .execute(&snapshot, &ids(&snapshot, &["A", "N"]))
            .await
            .unwrap_err();

        assert_eq!(deleter.calls(), vec!["A", "B", "C", "N"]);
        assert_eq!(err.last.identifier, "N", "names the last failure");
        assert_eq!(err.last.failure.status, Some(500));
        assert_eq!(err.report.failures.len(), 2);
        assert_eq!(err.report.deleted.len(), 2);
        assert!(err.to_string().starts_with("2 of 4 deletes failed"));
    }

    #[tokio::test]
    async fn test_always_cascades_after_parent_failure() {
        let snapshot = linked_snapshot();
        let deleter = Arc::new(RecordingDeleter::failing(&["A"]));
        let executor = DeletionExecutor::new(deleter.clone(), CascadeMode::Always);

        let err = executor
            .execute(&snapshot, &ids(&snapshot, &["A"]))
            .await
            .unwrap_err();

        assert_eq!(deleter.calls(), vec!["A", "B", "C"]);
        assert_eq!(err.last.identifier, "A");
        assert!(err.report.skipped_children.is_empty());
    }

    #[tokio::test]
    async fn test_on_parent_success_skips_children_of_failed_parent() {
        let snapshot = linked_snapshot();
        let deleter = Arc::new(RecordingDeleter::failing(&["A"]));
        let executor = DeletionExecutor::new(deleter.clone(), CascadeMode::OnParentSuccess);

        let err = executor
            .execute(&snapshot, &ids(&snapshot, &["A", "N"]))
            .await
            .unwrap_err();

        assert_eq!(deleter.calls(), vec!["A", "N"]);
        assert_eq!(err.report.skipped_children, ids(&snapshot, &["B", "C"]));
        assert_eq!(err.report.deleted, ids(&snapshot, &["N"]));
    }

    #[tokio::test]
    async fn test_on_parent_success_cascades_when_parent_deleted() {
        let snapshot = linked_snapshot();
        let deleter = Arc::new(RecordingDeleter::default());
        let executor = DeletionExecutor::new(deleter.clone(), CascadeMode::OnParentSuccess);

        executor
            .execute(&snapshot, &ids(&snapshot, &["A"]))
            .await
            .unwrap();

        assert_eq!(deleter.calls(), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_each_artifact_requested_once() {
        let snapshot = linked_snapshot();
        let mut deleter = MockArtifactDeleter::new();
        deleter.expect_delete().times(3).returning(|_| Ok(()));
        let executor = DeletionExecutor::new(Arc::new(deleter), CascadeMode::Always);

        // B is reachable both directly and through A.
        let report = executor
            .execute(&snapshot, &ids(&snapshot, &["A", "B"]))
            .await
            .unwrap();

        assert_eq!(report.attempted, 3);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let snapshot = linked_snapshot();
        let mut deleter = MockArtifactDeleter::new();
        deleter.expect_delete().never();
        let executor = DeletionExecutor::new(Arc::new(deleter), CascadeMode::Always);

        let report = executor.execute(&snapshot, &[]).await.unwrap();

        assert_eq!(report, DeletionReport::default());
    }
}

//! Cleanup Run Metrics
//!
//! Thread-safe counters for one or more cleanup runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::model::format_bytes;

/// Thread-safe metrics for tracking cleanup runs
#[derive(Debug, Clone)]
pub struct CleanupMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    /// Inventory records fetched
    artifacts_fetched: AtomicUsize,
    /// Manifest lists whose manifest was fetched
    manifests_resolved: AtomicUsize,
    /// Manifest lists the container registry did not know about
    manifests_not_found: AtomicUsize,
    /// Images referenced by more than one manifest list
    shared_references: AtomicUsize,
    /// Artifacts that passed every retention rule
    artifacts_eligible: AtomicUsize,
    /// Successful delete requests
    artifacts_deleted: AtomicUsize,
    /// Failed delete requests
    deletions_failed: AtomicUsize,
    /// Bytes freed by successful deletes
    bytes_reclaimed: AtomicU64,
}

impl Default for CleanupMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CleanupMetrics {
    /// Create a new metrics tracker
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                artifacts_fetched: AtomicUsize::new(0),
                manifests_resolved: AtomicUsize::new(0),
                manifests_not_found: AtomicUsize::new(0),
                shared_references: AtomicUsize::new(0),
                artifacts_eligible: AtomicUsize::new(0),
                artifacts_deleted: AtomicUsize::new(0),
                deletions_failed: AtomicUsize::new(0),
                bytes_reclaimed: AtomicU64::new(0),
            }),
        }
    }

    pub fn record_fetched(&self, count: usize) {
        self.inner
            .artifacts_fetched
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_manifests(&self, resolved: usize, not_found: usize, shared_references: usize) {
        self.inner
            .manifests_resolved
            .fetch_add(resolved, Ordering::Relaxed);
        self.inner
            .manifests_not_found
            .fetch_add(not_found, Ordering::Relaxed);
        self.inner
            .shared_references
            .fetch_add(shared_references, Ordering::Relaxed);
    }

    pub fn record_eligible(&self, count: usize) {
        self.inner
            .artifacts_eligible
            .fetch_add(count, Ordering::Relaxed);
    }

    /// Record the outcome of a deletion batch
    pub fn record_deletions(&self, deleted: usize, failed: usize, bytes_reclaimed: u64) {
        self.inner
            .artifacts_deleted
            .fetch_add(deleted, Ordering::Relaxed);
        self.inner
            .deletions_failed
            .fetch_add(failed, Ordering::Relaxed);
        self.inner
            .bytes_reclaimed
            .fetch_add(bytes_reclaimed, Ordering::Relaxed);
    }

    pub fn artifacts_fetched(&self) -> usize {
        self.inner.artifacts_fetched.load(Ordering::Relaxed)
    }

    pub fn manifests_resolved(&self) -> usize {
        self.inner.manifests_resolved.load(Ordering::Relaxed)
    }

    pub fn manifests_not_found(&self) -> usize {
        self.inner.manifests_not_found.load(Ordering::Relaxed)
    }

    pub fn shared_references(&self) -> usize {
        self.inner.shared_references.load(Ordering::Relaxed)
    }

    pub fn artifacts_eligible(&self) -> usize {
        self.inner.artifacts_eligible.load(Ordering::Relaxed)
    }

    pub fn artifacts_deleted(&self) -> usize {
        self.inner.artifacts_deleted.load(Ordering::Relaxed)
    }

    pub fn deletions_failed(&self) -> usize {
        self.inner.deletions_failed.load(Ordering::Relaxed)
    }

    pub fn bytes_reclaimed(&self) -> u64 {
        self.inner.bytes_reclaimed.load(Ordering::Relaxed)
    }

    /// Get a summary of all metrics
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            artifacts_fetched: self.artifacts_fetched(),
            manifests_resolved: self.manifests_resolved(),
            manifests_not_found: self.manifests_not_found(),
            shared_references: self.shared_references(),
            artifacts_eligible: self.artifacts_eligible(),
            artifacts_deleted: self.artifacts_deleted(),
            deletions_failed: self.deletions_failed(),
            bytes_reclaimed: self.bytes_reclaimed(),
        }
    }
}

/// Point-in-time copy of [`CleanupMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSummary {
    pub artifacts_fetched: usize,
    pub manifests_resolved: usize,
    pub manifests_not_found: usize,
    pub shared_references: usize,
    pub artifacts_eligible: usize,
    pub artifacts_deleted: usize,
    pub deletions_failed: usize,
    pub bytes_reclaimed: u64,
}

impl MetricsSummary {
    /// Log the metrics summary
    pub fn log(&self) {
        tracing::info!("=== Cleanup Metrics Summary ===");
        tracing::info!(
            "Inventory: {} artifacts fetched, {} eligible for deletion",
            self.artifacts_fetched,
            self.artifacts_eligible
        );
        tracing::info!(
            "Manifests: {} resolved, {} not found, {} shared image references",
            self.manifests_resolved,
            self.manifests_not_found,
            self.shared_references
        );
        tracing::info!(
            "Deletes: {} succeeded, {} failed, {} reclaimed",
            self.artifacts_deleted,
            self.deletions_failed,
            format_bytes(self.bytes_reclaimed)
        );
    }
}

//! End-to-end cleanup run.
//!
//! Stages run strictly in sequence: fetch, validate, build the manifest graph,
//! filter, then delete. A dry run stops after reporting the eligible set.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::config::{CascadeMode, Configuration};
use thiserror::Error;

use crate::deletion::{DeletionError, DeletionExecutor, DeletionReport};
use crate::graph::{GraphSettings, ManifestGraphBuilder, ResolutionError};
use crate::metrics::CleanupMetrics;
use crate::model::{Snapshot, ValidationError, format_bytes};
use crate::ports::{ArtifactDeleter, DigestResolver, InventoryFetcher};
use crate::retention::{PolicyError, RetentionFilter, RetentionPolicy};

/// Everything a run needs, resolved from configuration once.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub fetch_query: String,
    pub dry_run: bool,
    pub graph: GraphSettings,
    pub policy: RetentionPolicy,
    pub cascade: CascadeMode,
}

impl PipelineSettings {
    pub fn from_config(config: &Configuration) -> Result<Self, PolicyError> {
        Ok(Self {
            fetch_query: config.registry.fetch_query.clone(),
            dry_run: config.cleanup.dry_run,
            graph: GraphSettings {
                batch_size: config.cleanup.resolve_batch_size,
                default_namespace: config.registry.owner.clone(),
                default_repository: config.registry.repo.clone(),
            },
            policy: RetentionPolicy::try_from(&config.policy)?,
            cascade: config.cleanup.cascade,
        })
    }
}

/// Outcome of a run that finished without errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub dry_run: bool,
    /// Inventory records fetched.
    pub fetched: usize,
    /// Identifiers of the eligible top-level artifacts, in deletion order.
    pub eligible: Vec<String>,
    /// Size of the eligible artifacts and their children.
    pub eligible_bytes: u64,
    /// Deletion outcome, absent on dry runs.
    pub report: Option<DeletionReport>,
}

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("Failed to fetch inventory: {source}")]
    Fetch {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Inventory validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("Cleanup completed with failures: {0}")]
    Deletion(#[from] DeletionError),
}

impl CleanupError {
    /// True when every delete was attempted but some failed.
    pub fn is_completed_with_failures(&self) -> bool {
        matches!(self, CleanupError::Deletion(_))
    }
}

/// Orchestrates one cleanup run against the three registry collaborators.
pub struct CleanupPipeline {
    fetcher: Arc<dyn InventoryFetcher>,
    graph: ManifestGraphBuilder,
    filter: RetentionFilter,
    executor: DeletionExecutor,
    fetch_query: String,
    dry_run: bool,
    metrics: CleanupMetrics,
}

impl CleanupPipeline {
    pub fn new(
        fetcher: Arc<dyn InventoryFetcher>,
        resolver: Arc<dyn DigestResolver>,
        deleter: Arc<dyn ArtifactDeleter>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            fetcher,
            graph: ManifestGraphBuilder::new(resolver, settings.graph),
            filter: RetentionFilter::new(settings.policy),
            executor: DeletionExecutor::new(deleter, settings.cascade),
            fetch_query: settings.fetch_query,
            dry_run: settings.dry_run,
            metrics: CleanupMetrics::new(),
        }
    }

    pub fn metrics(&self) -> &CleanupMetrics {
        &self.metrics
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Run against the current time.
    pub async fn run(&self) -> Result<RunSummary, CleanupError> {
        self.run_at(Utc::now()).await
    }

    /// Run with artifact ages measured relative to `now`.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RunSummary, CleanupError> {
        tracing::info!(
            query = %self.fetch_query,
            dry_run = self.dry_run,
            "Starting cleanup run"
        );

        let records = self
            .fetcher
            .fetch_all(&self.fetch_query)
            .await
            .map_err(|e| CleanupError::Fetch { source: e.into() })?;
        let fetched = records.len();
        self.metrics.record_fetched(fetched);
        tracing::info!(fetched, "Fetched inventory");

        let mut snapshot = Snapshot::from_records(records)?;

        let stats = self.graph.build(&mut snapshot).await?;
        self.metrics
            .record_manifests(stats.resolved, stats.not_found, stats.shared_references);

        let outcome = self.filter.evaluate(&snapshot, now);
        for (reason, count) in outcome.exclusion_counts() {
            tracing::debug!(reason = %reason, count, "Excluded artifacts");
        }

        let eligible_bytes = snapshot.total_size(&outcome.eligible);
        self.metrics.record_eligible(outcome.eligible.len());
        tracing::info!(
            eligible = outcome.eligible.len(),
            size = %format_bytes(eligible_bytes),
            "Artifacts eligible for deletion"
        );
        for line in snapshot.listing(&outcome.eligible) {
            tracing::info!("{line}");
        }

        let eligible = outcome
            .eligible
            .iter()
            .map(|&id| snapshot.get(id).identifier.clone())
            .collect();

        if self.dry_run {
            tracing::info!("Dry run enabled, no artifacts were deleted");
            return Ok(RunSummary {
                dry_run: true,
                fetched,
                eligible,
                eligible_bytes,
                report: None,
            });
        }

        match self.executor.execute(&snapshot, &outcome.eligible).await {
            Ok(report) => {
                self.record_report(&report);
                Ok(RunSummary {
                    dry_run: false,
                    fetched,
                    eligible,
                    eligible_bytes,
                    report: Some(report),
                })
            }
            Err(e) => {
                self.record_report(&e.report);
                Err(e.into())
            }
        }
    }

    fn record_report(&self, report: &DeletionReport) {
        self.metrics.record_deletions(
            report.deleted.len(),
            report.failures.len(),
            report.bytes_reclaimed,
        );
    }
}

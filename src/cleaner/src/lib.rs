//! Registry Cleaner Library
//!
//! Decides which artifacts of a package registry can be deleted and deletes
//! them, cascading from container manifest lists to the images they reference.
//!
//! A run proceeds in fixed stages:
//! - Inventory validation into an immutable [`model::Snapshot`]
//! - Manifest graph building with bounded concurrent digest lookups
//! - Retention filtering with latest-version protection
//! - Sequential, best-effort deletion (skipped entirely on dry runs)
//!
//! The registry itself is reached only through the traits in [`ports`].

pub mod deletion;
pub mod graph;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod ports;
pub mod retention;

// Re-export commonly used types
pub use deletion::{DeletionError, DeletionExecutor, DeletionReport, FailedDeletion};
pub use graph::{
    DEFAULT_RESOLVE_BATCH_SIZE, GraphSettings, GraphStats, ManifestGraphBuilder, ResolutionError,
};
pub use metrics::{CleanupMetrics, MetricsSummary};
pub use model::{Artifact, ArtifactId, ArtifactKind, Snapshot, ValidationError};
pub use pipeline::{CleanupError, CleanupPipeline, PipelineSettings, RunSummary};
pub use ports::{
    ArtifactDeleter, DeleteFailure, DigestResolution, DigestResolver, InventoryFetcher,
    ManifestCoordinates,
};
pub use retention::{Exclusion, FilterOutcome, PolicyError, RetentionFilter, RetentionPolicy};

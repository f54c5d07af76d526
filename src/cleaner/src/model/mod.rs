//! In-memory model of a registry inventory.
//!
//! - `artifact`: one inventory record and its format classification
//! - `snapshot`: arena of all artifacts of a run plus manifest-list adjacency
//! - `validate`: completeness checks on raw records
//! - `describe`: rendering helpers for log output

pub mod artifact;
pub mod describe;
pub mod snapshot;
pub mod validate;

pub use artifact::{Artifact, ArtifactKind, Tags, strip_digest_prefix};
pub use describe::format_bytes;
pub use snapshot::{ArtifactId, Snapshot};
pub use validate::{REQUIRED_FIELDS, ValidationError};

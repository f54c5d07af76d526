//! Retention rules deciding which registry artifacts may be deleted.
//!
//! ## Architecture
//!
//! - `policy`: compiled policy built from `common::config::PolicyConfig`
//! - `filter`: ordered rule evaluation with latest-version protection
//!
//! ## Usage
//!
//! ```no_run
//! use cleaner::retention::{RetentionFilter, RetentionPolicy};
//! use common::config::PolicyConfig;
//!
//! let policy = RetentionPolicy::try_from(&PolicyConfig::default())?;
//! let filter = RetentionFilter::new(policy);
//! # let snapshot = cleaner::model::Snapshot::default();
//!
//! let outcome = filter.evaluate(&snapshot, chrono::Utc::now());
//! println!("{} artifacts eligible", outcome.eligible.len());
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod filter;
pub mod policy;

pub use filter::{Exclusion, FilterOutcome, RetentionFilter};
pub use policy::{PolicyError, RetentionPolicy};

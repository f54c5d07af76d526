//! Deletion of eligible artifacts.
//!
//! Deletes are issued one at a time. A manifest list is followed directly by
//! the images it owns, so a listing of the eligible set reads in the same
//! order as the delete log.

pub mod executor;

pub use executor::{DeletionError, DeletionExecutor, DeletionReport, FailedDeletion};

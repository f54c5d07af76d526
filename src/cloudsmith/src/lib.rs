//! Cloudsmith implementations of the registry collaborators used by the cleaner.
//!
//! - Package API: paginated inventory listing and deletion by permanent identifier
//! - Container registry: manifest list lookups resolving referenced image digests

mod client;
mod error;

pub use client::CloudsmithClient;
pub use error::SdkError;

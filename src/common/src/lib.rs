pub mod cli;
pub mod config;

pub use config::{CascadeMode, CleanupConfig, Configuration, PolicyConfig, RegistryConfig};

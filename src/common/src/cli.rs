use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Common CLI arguments shared by cleaner binaries
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

/// Subcommands available on the cleaner binary
#[derive(Subcommand, Debug, Clone, Default)]
pub enum CommonCommands {
    /// Run a cleanup pass (default behavior)
    #[default]
    Run,
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
    /// Show version information and exit
    Version,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Log level implied by the verbosity flags.
    pub fn log_level(args: &CommonArgs) -> &'static str {
        if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Initialize logging based on CLI arguments. `RUST_LOG` wins when set.
    pub fn init_logging(args: &CommonArgs) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(log_level(args)));

        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Display configuration in human-readable or JSON format. Secrets are redacted.
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        let config = config.redacted();
        if json {
            let json = serde_json::to_string_pretty(&config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            println!("Registry Cleaner Configuration:");
            println!("===============================");
            println!("dry_run = {}", config.cleanup.dry_run);
            println!();
            println!("registry.api_url = {}", config.registry.api_url);
            println!("registry.owner = {}", config.registry.owner);
            println!("registry.repo = {}", config.registry.repo);
            println!("registry.fetch_query = {}", config.registry.fetch_query);
            println!("registry.page_size = {}", config.registry.page_size);
            println!("registry.docker_registry = {}", config.registry.docker_registry);
            println!("registry.username = {}", config.registry.username);
            println!("registry.api_key = {}", config.registry.api_key);
            println!();
            println!("policy.name_regex = {}", config.policy.name_regex);
            println!("policy.format_regex = {}", config.policy.format_regex);
            println!(
                "policy.process_images_without_parent = {}",
                config.policy.process_images_without_parent
            );
            println!("policy.version_tag_regex = {}", config.policy.version_tag_regex);
            println!(
                "policy.allow_missing_version_tag = {}",
                config.policy.allow_missing_version_tag
            );
            println!(
                "policy.delete_after_days_with_tag = {}",
                config.policy.delete_after_days_with_tag
            );
            println!(
                "policy.delete_after_days_without_tag = {}",
                config.policy.delete_after_days_without_tag
            );
            println!();
            println!(
                "cleanup.resolve_batch_size = {}",
                config.cleanup.resolve_batch_size
            );
            println!("cleanup.cascade = {:?}", config.cleanup.cascade);
        }
        Ok(())
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        log::info!("Validating configuration...");
        config.validate().context("Invalid configuration")?;
        log::info!("Configuration validation passed");
        Ok(())
    }
}

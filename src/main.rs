//! Registry Cleaner
//!
//! Deletes stale artifacts from a Cloudsmith repository according to a
//! retention policy. Runs dry by default; pass `--execute` to delete.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cleaner::{CleanupPipeline, PipelineSettings};
use cloudsmith::CloudsmithClient;
use common::cli::{CommonArgs, CommonCommands, utils};
use common::config::Configuration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Only report what would be deleted
    #[arg(long, global = true, conflicts_with = "execute")]
    dry_run: bool,

    /// Delete eligible artifacts
    #[arg(long, global = true)]
    execute: bool,

    #[command(subcommand)]
    command: Option<CommonCommands>,
}

impl Cli {
    /// Dry-run override from the command line, if any
    fn dry_run_override(&self) -> Option<bool> {
        match (self.dry_run, self.execute) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }

    fn load_config(&self) -> Result<Configuration> {
        let mut config = utils::load_config(self.common.config.as_ref())?;
        if let Some(dry_run) = self.dry_run_override() {
            config.cleanup.dry_run = dry_run;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    utils::init_logging(&cli.common);

    if let Err(e) = run(cli).await {
        log::error!("{e}");
        for cause in e.chain().skip(1) {
            log::error!("  caused by: {cause}");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command.clone().unwrap_or_default() {
        CommonCommands::Version => {
            println!("registry-cleaner {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CommonCommands::Config { json } => {
            let config = cli.load_config()?;
            utils::display_config(&config, json)
        }
        CommonCommands::Validate => {
            let config = cli.load_config()?;
            utils::validate_config(&config)?;
            PipelineSettings::from_config(&config).context("Invalid retention policy")?;
            Ok(())
        }
        CommonCommands::Run => {
            let config = cli.load_config()?;
            utils::validate_config(&config)?;
            cleanup(&config).await
        }
    }
}

async fn cleanup(config: &Configuration) -> Result<()> {
    let settings = PipelineSettings::from_config(config).context("Invalid retention policy")?;
    let client = Arc::new(CloudsmithClient::new(&config.registry));
    let pipeline = CleanupPipeline::new(client.clone(), client.clone(), client, settings);

    log::info!(
        "Cleaning {}/{} ({})",
        config.registry.owner,
        config.registry.repo,
        if pipeline.is_dry_run() { "dry run" } else { "executing deletes" }
    );

    let result = pipeline.run().await;
    pipeline.metrics().summary().log();

    match result {
        Ok(summary) => {
            log::info!(
                "Cleanup finished: {} of {} artifacts eligible",
                summary.eligible.len(),
                summary.fetched
            );
            Ok(())
        }
        Err(e) if e.is_completed_with_failures() => Err(e.into()),
        Err(e) => Err(e).context("Cleanup aborted"),
    }
}

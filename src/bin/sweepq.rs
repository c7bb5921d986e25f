//! Sweepq CLI Binary
//!
//! Command-line interface for registering tables, writing values and driving
//! sweep cycles against a local store.

use anyhow::Context;
use clap::Parser;
use std::process;
use sweepq::cli::{Cli, RunContext};
use sweepq::config::{ConfigLoader, SweepConfig};
use sweepq::logging::init_logging;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{:#}", e);
            process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("Sweepq CLI starting");

    let context = match RunContext::new(&config) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Error opening store: {}", e);
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    match context.execute(&cli.command) {
        Ok(output) => {
            info!("Command completed successfully");
            println!("{}", output);
        }
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

/// Config file, then CLI flags on top.
fn build_config(cli: &Cli) -> anyhow::Result<SweepConfig> {
    let mut config = ConfigLoader::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Some(ref db) = cli.db {
        config.storage.db_path = db.clone();
    }
    if cli.quiet {
        config.logging.enabled = false;
    }
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.logging.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.logging.output = output.clone();
    }
    Ok(config)
}

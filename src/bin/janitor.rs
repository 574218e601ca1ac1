//! Janitor CLI Binary
//!
//! Command-line interface for the Synapse disk-space janitor.

use clap::Parser;
use std::process;
use synapse_janitor::cli::{map_error, Cli, RunContext};
use synapse_janitor::config::ConfigLoader;
use synapse_janitor::logging::{init_logging, LoggingConfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let logging_config = build_logging_config(&cli);
    if let Err(e) = init_logging(&logging_config) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("janitor starting");

    let shutdown = CancellationToken::new();
    spawn_ctrl_c_handler(shutdown.clone());

    let context = match RunContext::new(cli.workdir.clone(), cli.config.clone(), shutdown) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Error initializing janitor: {}", e);
            eprintln!("{}", map_error(&e));
            process::exit(1);
        }
    };

    match context.execute(&cli.command).await {
        Ok(output) => {
            info!("Command completed successfully");
            println!("{}", output);
        }
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("{}", map_error(&e));
            process::exit(1);
        }
    }
}

/// First Ctrl-C cancels running work so checkpoints get saved; a second one exits.
fn spawn_ctrl_c_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("interrupt received, stopping after the current step");
        shutdown.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            process::exit(130);
        }
    });
}

/// Build logging configuration from CLI args and the config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = if let Some(ref config_path) = cli.config {
        ConfigLoader::load_from_file(config_path)
            .ok()
            .map(|c| c.logging)
            .unwrap_or_default()
    } else {
        ConfigLoader::load(&cli.workdir)
            .ok()
            .map(|c| c.logging)
            .unwrap_or_default()
    };

    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.file = file.clone();
    }
    if config.file.is_relative() {
        config.file = cli.workdir.join(&config.file);
    }

    config
}

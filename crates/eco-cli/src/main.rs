//! Command-line interface for Danfoss Eco radiator thermostats.

mod cli;
mod commands;
mod config;
mod format;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::{cmd_pair, cmd_read, cmd_set, cmd_sync_clock, cmd_watch};
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(Config::path);
    let config = Config::load(&config_path)?;
    tracing::debug!(path = %config_path.display(), ?config, "Loaded config");

    match cli.command {
        Commands::Read { device, format } => cmd_read(&device, &config, format).await,
        Commands::Set {
            device,
            setting,
            value,
        } => cmd_set(&device, &config, setting, &value, cli.quiet).await,
        Commands::SyncClock { device } => cmd_sync_clock(&device, &config, cli.quiet).await,
        Commands::Pair { device, save } => {
            cmd_pair(&device, &config, &config_path, save, cli.quiet).await
        }
        Commands::Watch {
            device,
            interval,
            format,
        } => cmd_watch(&device, &config, interval, format).await,
    }
}

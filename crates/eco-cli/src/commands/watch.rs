//! Watch command implementation.
//!
//! Keeps one connection open and refreshes on an interval. The connection is
//! re-established with exponential backoff when it drops.

use std::time::Duration;

use anyhow::Result;
use eco_core::EcoDevice;
use tracing::warn;

use crate::cli::{DeviceArgs, OutputFormat};
use crate::config::{Config, resolve_interval};
use crate::format::{format_snapshot_json, format_watch_line};
use crate::util::{connect, report_failures};

/// Minimum backoff delay for reconnection attempts
const MIN_BACKOFF_SECS: u64 = 2;
/// Maximum backoff delay for reconnection attempts
const MAX_BACKOFF_SECS: u64 = 300;

pub async fn cmd_watch(
    args: &DeviceArgs,
    config: &Config,
    interval: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    let interval = Duration::from_secs(resolve_interval(interval, config));
    let mut current: Option<EcoDevice> = None;
    let mut backoff_secs = MIN_BACKOFF_SECS;

    eprintln!("Interval: {}s | Press Ctrl+C to stop", interval.as_secs());

    loop {
        if !current.as_ref().is_some_and(EcoDevice::is_connected) {
            if current.take().is_some() {
                eprintln!("Connection lost. Reconnecting...");
            }
            match connect(args, config).await {
                Ok(device) => {
                    backoff_secs = MIN_BACKOFF_SECS;
                    current = Some(device);
                }
                Err(e) => {
                    eprintln!("{e:#}. Retrying in {backoff_secs}s...");
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {
                            eprintln!("\nShutting down...");
                            return Ok(());
                        }
                        _ = tokio::time::sleep(Duration::from_secs(backoff_secs)) => {}
                    }
                    backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                    continue;
                }
            }
        }

        if let Some(device) = current.as_mut() {
            let outcomes = device.refresh().await;
            if report_failures(&outcomes) > 0 {
                warn!("Some properties could not be refreshed");
            }
            let snapshot = device.thermostat().snapshot();
            match format {
                OutputFormat::Json => println!("{}", format_snapshot_json(&snapshot)?),
                OutputFormat::Text => println!("{}", format_watch_line(&snapshot)),
            }
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nShutting down...");
                if let Some(mut device) = current.take() {
                    device.disconnect().await.ok();
                }
                return Ok(());
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

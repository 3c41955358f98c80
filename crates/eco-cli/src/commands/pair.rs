//! Pairing: read the secret key of a valve.

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::DeviceArgs;
use crate::config::Config;
use crate::util::{connect, require_device};

pub async fn cmd_pair(
    args: &DeviceArgs,
    config: &Config,
    config_path: &Path,
    save: bool,
    quiet: bool,
) -> Result<()> {
    let identifier = require_device(args, config)?;
    if !quiet {
        eprintln!("Press the button on the valve, then wait for the pairing indicator.");
    }

    let mut device = connect(args, config).await?;
    let key = device.read_secret_key().await;
    device.disconnect().await.ok();
    let key = key.context("Failed to read the secret key; is the valve in pairing mode?")?;

    let hex = key.to_hex();
    println!("{hex}");

    if save {
        let mut updated = config.clone();
        updated.secret_key = Some(hex);
        if updated.device.is_none() {
            updated.device = Some(identifier);
        }
        updated.save(config_path)?;
        if !quiet {
            eprintln!("Saved to {}", config_path.display());
        }
    }
    Ok(())
}

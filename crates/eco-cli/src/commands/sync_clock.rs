//! Clock synchronisation.

use anyhow::{Context, Result};
use time::OffsetDateTime;
use tracing::warn;

use crate::cli::DeviceArgs;
use crate::config::Config;
use crate::util::{connect, require_success};

pub async fn cmd_sync_clock(args: &DeviceArgs, config: &Config, quiet: bool) -> Result<()> {
    let mut device = connect(args, config).await?;

    // Take the time after connecting, which can take several seconds.
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| {
        warn!("Local UTC offset unavailable; using UTC");
        OffsetDateTime::now_utc()
    });
    let result = match device.thermostat().sync_clock(now) {
        Ok(command) => {
            device.submit(command);
            require_success(device.flush().await)
        }
        Err(e) => Err(e.into()),
    };
    device.disconnect().await.ok();

    result.context("Clock was not updated")?;
    if !quiet {
        println!("Clock set to {now}");
    }
    Ok(())
}

//! Read command implementation.

use anyhow::Result;

use crate::cli::{DeviceArgs, OutputFormat};
use crate::config::Config;
use crate::format::{DeviceReport, format_report_json, format_report_text};
use crate::util::{connect, report_failures};

pub async fn cmd_read(args: &DeviceArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let mut device = connect(args, config).await?;
    let outcomes = device.refresh().await;
    device.disconnect().await.ok();

    let failed = report_failures(&outcomes);
    let snapshot = device.thermostat().snapshot();
    let report = DeviceReport {
        address: device.address(),
        mac_address: device.mac_address(),
        snapshot: &snapshot,
    };
    let content = match format {
        OutputFormat::Json => format_report_json(&report)?,
        OutputFormat::Text => format_report_text(&report),
    };
    print!("{content}");
    if format == OutputFormat::Json {
        println!();
    }

    if failed == outcomes.len() && !outcomes.is_empty() {
        anyhow::bail!("Could not read any property");
    }
    Ok(())
}

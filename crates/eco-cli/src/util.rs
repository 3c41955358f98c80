//! Connection and reporting helpers shared by the commands.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use eco_core::{ConnectionConfig, EcoDevice, Outcome, SecretKey};
use eco_types::{PinCode, ScheduleMode};
use tracing::{info, warn};

use crate::cli::DeviceArgs;
use crate::config::{Config, resolve_device, resolve_timeout};

/// The device identifier from the arguments or config.
pub fn require_device(args: &DeviceArgs, config: &Config) -> Result<String> {
    resolve_device(args.device.clone(), config).context(
        "No device specified. Use --device, set ECO_DEVICE, or set `device` in the config file",
    )
}

/// Build the connection config from the arguments, falling back to the config file.
pub fn connection_config(args: &DeviceArgs, config: &Config) -> Result<ConnectionConfig> {
    let timeout = Duration::from_secs(resolve_timeout(args.timeout, config));
    let mut connection = ConnectionConfig::new().connection_timeout(timeout);

    let key = match &args.key {
        Some(hex) => Some(
            hex.parse::<SecretKey>()
                .context("--key must be exactly 32 hex characters")?,
        ),
        None => config.secret_key()?,
    };
    if let Some(key) = key {
        connection = connection.secret_key(key);
    }

    let pin = match &args.pin {
        Some(pin) => Some(pin.parse::<PinCode>().context("--pin must be exactly 4 digits")?),
        None => config.pin()?,
    };
    if let Some(pin) = pin {
        connection = connection.pin(pin);
    }

    Ok(connection)
}

/// Connect to the device selected by `args`.
pub async fn connect(args: &DeviceArgs, config: &Config) -> Result<EcoDevice> {
    let identifier = require_device(args, config)?;
    let connection = connection_config(args, config)?;
    if connection.secret_key.is_none() {
        warn!("No secret key configured; only unencrypted properties can be read");
    }

    info!(device = %identifier, "Connecting");
    EcoDevice::connect_with_config(&identifier, connection)
        .await
        .with_context(|| format!("Failed to connect to {identifier}"))
}

/// Log every failed outcome. Returns how many failed.
pub fn report_failures(outcomes: &[Outcome]) -> usize {
    let mut failed = 0;
    for outcome in outcomes {
        if let Some(error) = outcome.error() {
            warn!(property = outcome.property(), kind = %outcome.kind(), error = %error, "Command failed");
            failed += 1;
        }
    }
    failed
}

/// Fail with the first error among `outcomes`.
pub fn require_success(outcomes: Vec<Outcome>) -> Result<()> {
    for outcome in outcomes {
        let property = outcome.property();
        let kind = outcome.kind();
        if let Some(error) = outcome.into_error() {
            return Err(error).with_context(|| format!("Failed to {kind} {property}"));
        }
    }
    Ok(())
}

/// Parse an on/off switch value.
pub fn parse_switch(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => bail!("Expected on or off, got '{other}'"),
    }
}

/// Parse a schedule mode name.
///
/// `heat`, `auto` and `away` are accepted as aliases of manual, scheduled
/// and vacation.
pub fn parse_schedule_mode(value: &str) -> Result<ScheduleMode> {
    match value.to_ascii_lowercase().as_str() {
        "manual" | "heat" => Ok(ScheduleMode::Manual),
        "scheduled" | "schedule" | "auto" => Ok(ScheduleMode::Scheduled),
        "vacation" | "away" => Ok(ScheduleMode::Vacation),
        "hold" => Ok(ScheduleMode::Hold),
        other => bail!("Expected manual, scheduled, vacation or hold, got '{other}'"),
    }
}

/// Parse a temperature in °C.
pub fn parse_celsius(value: &str) -> Result<f32> {
    value
        .trim_end_matches("°C")
        .trim()
        .parse()
        .with_context(|| format!("Expected a temperature in °C, got '{value}'"))
}

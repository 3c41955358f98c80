//! Locating a Danfoss Eco valve by name or address.

use std::time::Duration;

use btleplug::api::{Central, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{DeviceNotFoundReason, Error, Result};
use crate::util::{address_matches, format_peripheral_id};
use eco_types::uuids::{DEVICE_NAME_PREFIX, ECO_SERVICE};

/// Options for device lookup.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Total time to spend scanning.
    pub duration: Duration,
    /// Number of scan attempts the duration is spread over.
    pub attempts: u32,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(10),
            attempts: 3,
        }
    }
}

impl ScanOptions {
    /// Create new scan options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the total scan duration.
    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set the number of scan attempts (at least one).
    #[must_use]
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    fn attempt_duration(&self) -> Duration {
        let per_attempt = self.duration / self.attempts.max(1);
        per_attempt.max(Duration::from_secs(2))
    }
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter))
}

/// Whether advertised properties look like a Danfoss Eco valve.
pub fn is_eco_device(properties: &PeripheralProperties) -> bool {
    properties.services.contains(&ECO_SERVICE)
        || properties
            .local_name
            .as_deref()
            .is_some_and(|name| name.starts_with(DEVICE_NAME_PREFIX))
}

/// Find a specific device by name or address.
pub async fn find_device(identifier: &str) -> Result<(Adapter, Peripheral)> {
    find_device_with_options(identifier, ScanOptions::default()).await
}

/// Find a specific device by name or address with custom options.
///
/// Checks peripherals the adapter already knows first, then scans in
/// several short attempts, since valves advertise infrequently.
#[tracing::instrument(level = "info", skip(options), fields(attempts = options.attempts))]
pub async fn find_device_with_options(
    identifier: &str,
    options: ScanOptions,
) -> Result<(Adapter, Peripheral)> {
    let adapter = get_adapter().await?;
    let identifier_lower = identifier.to_lowercase();

    if let Some(peripheral) = find_known_peripheral(&adapter, &identifier_lower).await? {
        info!("Found device without scanning");
        return Ok((adapter, peripheral));
    }

    let scan_duration = options.attempt_duration();
    for attempt in 1..=options.attempts {
        info!(attempt, total = options.attempts, ?scan_duration, "Scanning");

        adapter.start_scan(ScanFilter::default()).await?;
        sleep(scan_duration).await;
        adapter.stop_scan().await?;

        if let Some(peripheral) = find_known_peripheral(&adapter, &identifier_lower).await? {
            info!(attempt, "Found device");
            return Ok((adapter, peripheral));
        }
    }

    warn!("Device not found after {} attempts", options.attempts);
    Err(Error::DeviceNotFound(DeviceNotFoundReason::ScanTimeout {
        duration: options.duration,
    }))
}

/// Search through known peripherals to find one matching the identifier.
async fn find_known_peripheral(
    adapter: &Adapter,
    identifier_lower: &str,
) -> Result<Option<Peripheral>> {
    for peripheral in adapter.peripherals().await? {
        let Ok(Some(props)) = peripheral.properties().await else {
            continue;
        };
        let peripheral_id = format_peripheral_id(&peripheral.id()).to_lowercase();

        let matched = if peripheral_id == identifier_lower {
            debug!(%peripheral_id, "Matched by peripheral ID");
            true
        } else if address_matches(&props.address.to_string(), identifier_lower) {
            debug!(address = %props.address, "Matched by address");
            true
        } else if props
            .local_name
            .as_deref()
            .is_some_and(|name| name.to_lowercase().contains(identifier_lower))
        {
            debug!(name = ?props.local_name, "Matched by name");
            true
        } else {
            false
        };

        if matched {
            if !is_eco_device(&props) {
                warn!(
                    name = ?props.local_name,
                    "Matched peripheral does not advertise as a Danfoss Eco valve"
                );
            }
            return Ok(Some(peripheral));
        }
    }

    Ok(None)
}

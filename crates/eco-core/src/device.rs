//! Connection to a real Danfoss Eco valve.
//!
//! [`BleClient`] is the btleplug implementation of [`GattClient`]: every
//! issued operation runs in its own tokio task and reports back as a
//! [`GattEvent`]. [`EcoDevice`] ties it together with a [`Driver`] and the
//! [`Thermostat`] property handles.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use btleplug::api::{
    Central, CentralEvent, Characteristic, Peripheral as _, PeripheralProperties, WriteType,
};
use btleplug::platform::{Adapter, Peripheral, PeripheralId};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cipher::SecretKey;
use crate::client::{EventReceiver, EventSender, GattClient, GattEvent, OpId, event_channel};
use crate::command::Command;
use crate::driver::{Driver, DriverConfig, Outcome};
use crate::error::{Error, Result};
use crate::properties::SecretKeyProperty;
use crate::property::Property;
use crate::retry::{RetryConfig, with_retry};
use crate::scan::{ScanOptions, find_device_with_options};
use crate::thermostat::Thermostat;
use crate::util::{create_identifier, format_peripheral_id, mac_address};
use eco_types::{PinCode, uuids};

/// Default timeout for BLE connection operations.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for service discovery.
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time an issued command may wait for its completion.
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for the PIN login write.
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for connecting to a valve.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use eco_core::ConnectionConfig;
///
/// let config = ConnectionConfig::challenging_environment()
///     .pin("1234".parse().unwrap())
///     .response_timeout(Duration::from_secs(8));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for finding and connecting to the valve.
    pub connection_timeout: Duration,
    /// Timeout for service discovery after connection.
    pub discovery_timeout: Duration,
    /// Time an issued read or write may take to complete.
    pub response_timeout: Duration,
    /// Timeout for the PIN login write.
    pub write_timeout: Duration,
    /// PIN written right after connecting, if the valve has one set.
    pub pin: Option<PinCode>,
    /// Session key installed right after connecting.
    pub secret_key: Option<SecretKey>,
    /// Retry policy for the connection attempt.
    pub retry: RetryConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECT_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            pin: None,
            secret_key: None,
            retry: RetryConfig::for_connect(),
        }
    }
}

impl ConnectionConfig {
    /// Create a new connection config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Longer timeouts for valves behind walls or far from the adapter.
    pub fn challenging_environment() -> Self {
        Self {
            connection_timeout: Duration::from_secs(25),
            discovery_timeout: Duration::from_secs(15),
            response_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(15),
            retry: RetryConfig::for_connect().max_retries(5),
            ..Self::default()
        }
    }

    /// Short timeouts for a valve next to the adapter.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(8),
            discovery_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(3),
            write_timeout: Duration::from_secs(5),
            retry: RetryConfig::for_connect().max_retries(1),
            ..Self::default()
        }
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the service discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the per-command response timeout.
    #[must_use]
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the PIN login write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Log in with `pin` after connecting.
    #[must_use]
    pub fn pin(mut self, pin: PinCode) -> Self {
        self.pin = Some(pin);
        self
    }

    /// Install `key` after connecting.
    #[must_use]
    pub fn secret_key(mut self, key: SecretKey) -> Self {
        self.secret_key = Some(key);
        self
    }

    /// Set the connection retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// btleplug-backed [`GattClient`].
pub struct BleClient {
    peripheral: Peripheral,
    characteristics: HashMap<Uuid, Characteristic>,
    events: EventSender,
    connected: Arc<AtomicBool>,
    operation_timeout: Duration,
    last_op: OpId,
}

impl fmt::Debug for BleClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BleClient")
            .field("characteristics", &self.characteristics.len())
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .field("operation_timeout", &self.operation_timeout)
            .finish_non_exhaustive()
    }
}

impl BleClient {
    /// Wrap a connected peripheral whose services have been discovered.
    ///
    /// Completions are sent on `events`. Each operation is abandoned after
    /// `operation_timeout`.
    pub fn new(
        peripheral: Peripheral,
        characteristics: HashMap<Uuid, Characteristic>,
        events: EventSender,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            peripheral,
            characteristics,
            events,
            connected: Arc::new(AtomicBool::new(true)),
            operation_timeout,
            last_op: OpId::new(0),
        }
    }

    /// Flag cleared when the link goes down.
    pub fn connection_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.connected)
    }

    fn prepare(&self, characteristic: &Uuid) -> Result<Characteristic> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.characteristics
            .get(characteristic)
            .cloned()
            .ok_or_else(|| Error::characteristic_not_found(characteristic))
    }

    fn allocate_op(&mut self) -> OpId {
        self.last_op = self.last_op.next();
        self.last_op
    }

    fn spawn<F>(&self, operation: F) -> Result<()>
    where
        F: Future<Output = GattEvent> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().map_err(std::io::Error::other)?;
        let events = self.events.clone();
        runtime.spawn(async move {
            // A closed channel means the device was dropped.
            let _ = events.send(operation.await);
        });
        Ok(())
    }

    fn failure(
        op: OpId,
        characteristic: Uuid,
        error: btleplug::Error,
        connected: &AtomicBool,
    ) -> GattEvent {
        match error {
            btleplug::Error::NotConnected => {
                connected.store(false, Ordering::SeqCst);
                GattEvent::Disconnected
            }
            other => GattEvent::OperationFailed {
                op,
                characteristic,
                reason: other.to_string(),
            },
        }
    }
}

impl GattClient for BleClient {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn has_characteristic(&self, characteristic: &Uuid) -> bool {
        self.characteristics.contains_key(characteristic)
    }

    fn issue_read(&mut self, characteristic: Uuid) -> Result<OpId> {
        let target = self.prepare(&characteristic)?;
        let peripheral = self.peripheral.clone();
        let connected = self.connection_flag();
        let limit = self.operation_timeout;
        let op = self.allocate_op();

        debug!(%characteristic, %op, "Issuing read");
        self.spawn(async move {
            match timeout(limit, peripheral.read(&target)).await {
                Ok(Ok(value)) => GattEvent::ReadResponse {
                    op,
                    characteristic,
                    value,
                },
                Ok(Err(e)) => Self::failure(op, characteristic, e, &connected),
                Err(_) => GattEvent::OperationFailed {
                    op,
                    characteristic,
                    reason: format!("no response within {limit:?}"),
                },
            }
        })?;
        Ok(op)
    }

    fn issue_write(&mut self, characteristic: Uuid, value: Vec<u8>) -> Result<OpId> {
        let target = self.prepare(&characteristic)?;
        let peripheral = self.peripheral.clone();
        let connected = self.connection_flag();
        let limit = self.operation_timeout;
        let op = self.allocate_op();

        debug!(%characteristic, %op, len = value.len(), "Issuing write");
        self.spawn(async move {
            let write = peripheral.write(&target, &value, WriteType::WithResponse);
            match timeout(limit, write).await {
                Ok(Ok(())) => GattEvent::WriteResponse { op, characteristic },
                Ok(Err(e)) => Self::failure(op, characteristic, e, &connected),
                Err(_) => GattEvent::OperationFailed {
                    op,
                    characteristic,
                    reason: format!("no acknowledgement within {limit:?}"),
                },
            }
        })?;
        Ok(op)
    }
}

/// A connected Danfoss Eco valve.
///
/// # Cleanup
///
/// Call [`EcoDevice::disconnect`] before dropping the device. Dropping a
/// connected device logs a warning and disconnects in the background.
pub struct EcoDevice {
    /// Kept alive for the lifetime of the connection.
    #[allow(dead_code)]
    adapter: Adapter,
    peripheral: Peripheral,
    name: Option<String>,
    address: String,
    mac_address: Option<String>,
    driver: Driver<BleClient>,
    events: EventReceiver,
    thermostat: Thermostat,
    watcher: JoinHandle<()>,
    disconnected: bool,
    config: ConnectionConfig,
}

impl fmt::Debug for EcoDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcoDevice")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("has_key", &self.driver.session().has_key())
            .finish_non_exhaustive()
    }
}

impl EcoDevice {
    /// Connect to a valve by name or address with default settings.
    pub async fn connect(identifier: &str) -> Result<Self> {
        Self::connect_with_config(identifier, ConnectionConfig::default()).await
    }

    /// Connect to a valve by name or address.
    #[tracing::instrument(level = "info", skip_all, fields(identifier = %identifier))]
    pub async fn connect_with_config(identifier: &str, config: ConnectionConfig) -> Result<Self> {
        let options = ScanOptions::new().duration(config.connection_timeout);
        let (adapter, peripheral) = find_device_with_options(identifier, options).await?;
        Self::from_peripheral_with_config(adapter, peripheral, config).await
    }

    /// Connect to an already discovered peripheral.
    #[tracing::instrument(level = "info", skip_all, fields(connect_timeout = ?config.connection_timeout))]
    pub async fn from_peripheral_with_config(
        adapter: Adapter,
        peripheral: Peripheral,
        config: ConnectionConfig,
    ) -> Result<Self> {
        info!("Connecting to device...");
        let connect_timeout = config.connection_timeout;
        let target = &peripheral;
        with_retry(&config.retry, "connect to device", || async move {
            timeout(connect_timeout, target.connect())
                .await
                .map_err(|_| Error::timeout("connect to device", connect_timeout))??;
            Ok(())
        })
        .await?;
        info!("Connected");

        timeout(config.discovery_timeout, peripheral.discover_services())
            .await
            .map_err(|_| Error::timeout("discover services", config.discovery_timeout))??;

        let mut characteristics = HashMap::new();
        for service in peripheral.services() {
            debug!("  Service: {}", service.uuid);
            for characteristic in service.characteristics {
                debug!("    Characteristic: {}", characteristic.uuid);
                characteristics.insert(characteristic.uuid, characteristic);
            }
        }
        debug!("Cached {} characteristics", characteristics.len());

        let properties = peripheral.properties().await?;
        let name = properties.as_ref().and_then(|p| p.local_name.clone());
        let address = device_address(properties.as_ref(), &peripheral.id());
        let mac = properties
            .as_ref()
            .and_then(|p| mac_address(&p.address.to_string()));

        if let Some(pin) = &config.pin {
            login(&peripheral, &characteristics, pin, config.write_timeout).await?;
        }

        let (sender, events) = event_channel();
        let client = BleClient::new(
            peripheral.clone(),
            characteristics,
            sender.clone(),
            config.response_timeout,
        );
        let watcher =
            watch_disconnect(&adapter, peripheral.id(), client.connection_flag(), sender).await?;

        let mut driver = Driver::new(
            client,
            DriverConfig::new().response_timeout(config.response_timeout),
        );
        if let Some(key) = &config.secret_key {
            driver.install_key(key.clone());
        }

        info!(name = ?name, %address, "Session ready");
        Ok(Self {
            adapter,
            peripheral,
            name,
            address,
            mac_address: mac,
            driver,
            events,
            thermostat: Thermostat::new(),
            watcher,
            disconnected: false,
            config,
        })
    }

    /// The property handles of this valve.
    pub fn thermostat(&self) -> &Thermostat {
        &self.thermostat
    }

    /// The connection driver.
    pub fn driver(&self) -> &Driver<BleClient> {
        &self.driver
    }

    /// The configuration the device was connected with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Get the device name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Get the device address or identifier.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The Bluetooth MAC address, when the platform exposes it.
    pub fn mac_address(&self) -> Option<&str> {
        self.mac_address.as_deref()
    }

    /// Whether the link is still up.
    pub fn is_connected(&self) -> bool {
        !self.disconnected && self.driver.client().is_connected()
    }

    /// Install the session key.
    pub fn install_key(&mut self, key: SecretKey) {
        self.driver.install_key(key);
    }

    /// Queue a command. It runs on the next [`EcoDevice::flush`].
    pub fn submit(&mut self, command: Command) {
        self.driver.push(command);
    }

    /// Run every queued command to completion.
    pub async fn flush(&mut self) -> Vec<Outcome> {
        self.driver.run_until_idle(&mut self.events).await
    }

    /// Read every property of the valve.
    pub async fn refresh(&mut self) -> Vec<Outcome> {
        for command in self.thermostat.poll_commands() {
            self.driver.push(command);
        }
        self.flush().await
    }

    /// Read the secret key. The valve only exposes it in pairing mode.
    ///
    /// Commands queued before the call are flushed along with the read.
    pub async fn read_secret_key(&mut self) -> Result<SecretKey> {
        let property = Arc::new(SecretKeyProperty::new());
        self.driver.push(Command::read(property.clone()));

        let outcome = self
            .flush()
            .await
            .into_iter()
            .find(|o| o.property() == property.name());
        if let Some(error) = outcome.and_then(Outcome::into_error) {
            return Err(error);
        }
        property.value().ok_or(Error::ValueUnknown {
            property: property.name(),
        })
    }

    /// Disconnect from the valve.
    ///
    /// Queued commands are failed and the session key is cleared.
    #[tracing::instrument(level = "info", skip(self), fields(device_name = ?self.name))]
    pub async fn disconnect(&mut self) -> Result<()> {
        info!("Disconnecting from device...");
        self.disconnected = true;
        self.watcher.abort();
        self.driver.connection_lost();
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

impl Drop for EcoDevice {
    fn drop(&mut self) {
        if self.disconnected {
            return;
        }
        self.disconnected = true;
        self.watcher.abort();

        warn!(
            device_name = ?self.name,
            device_address = %self.address,
            "EcoDevice dropped without calling disconnect() - performing best-effort cleanup"
        );

        let peripheral = self.peripheral.clone();
        let address = self.address.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = peripheral.disconnect().await {
                    debug!(device_address = %address, error = %e, "Best-effort disconnect failed");
                }
            });
        }
    }
}

fn device_address(properties: Option<&PeripheralProperties>, id: &PeripheralId) -> String {
    properties
        .map(|p| create_identifier(&p.address.to_string(), id))
        .unwrap_or_else(|| format_peripheral_id(id))
}

/// Write the PIN so the valve accepts further operations.
async fn login(
    peripheral: &Peripheral,
    characteristics: &HashMap<Uuid, Characteristic>,
    pin: &PinCode,
    write_timeout: Duration,
) -> Result<()> {
    let characteristic = characteristics
        .get(&uuids::PIN_CODE)
        .ok_or_else(|| Error::characteristic_not_found(uuids::PIN_CODE))?;

    debug!("Writing PIN");
    let pin_bytes = pin.to_bytes();
    let write = peripheral.write(characteristic, &pin_bytes, WriteType::WithResponse);
    match timeout(write_timeout, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Error::WriteFailed {
            uuid: uuids::PIN_CODE.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(Error::timeout("write PIN", write_timeout)),
    }
}

/// Forward the adapter's disconnect event for `id` onto the event channel.
async fn watch_disconnect(
    adapter: &Adapter,
    id: PeripheralId,
    connected: Arc<AtomicBool>,
    events: EventSender,
) -> Result<JoinHandle<()>> {
    let mut stream = adapter.events().await?;
    Ok(tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            if let CentralEvent::DeviceDisconnected(disconnected) = event {
                if disconnected == id {
                    info!("Device disconnected");
                    connected.store(false, Ordering::SeqCst);
                    let _ = events.send(GattEvent::Disconnected);
                    break;
                }
            }
        }
    }))
}

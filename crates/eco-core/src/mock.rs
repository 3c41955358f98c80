//! In-memory peripheral for testing.
//!
//! [`MockClient`] implements [`GattClient`] without BLE hardware. Values are
//! stored exactly as they would be on the valve (encrypted where the
//! characteristic is encrypted); writes overwrite the stored value.
//!
//! # Features
//!
//! - **Auto-response**: completions are pushed onto an event channel as soon
//!   as an operation is issued
//! - **Failure injection**: drop the link, reject issuing (globally or per
//!   characteristic), NACK writes, or stay silent so the driver's timeout fires

use std::collections::{HashMap, HashSet};

use eco_types::{
    DEVICE_NAME_BYTES, DeviceClock, DeviceErrors, DeviceSettings, TemperatureReading, uuids,
};
use uuid::Uuid;

use crate::cipher::{self, SecretKey};
use crate::client::{EventReceiver, EventSender, GattClient, GattEvent, OpId, event_channel};
use crate::error::{Error, Result};

/// An operation issued against a [`MockClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuedOp {
    /// A read of the characteristic.
    Read(Uuid),
    /// A write of the raw payload.
    Write(Uuid, Vec<u8>),
}

/// A mock Danfoss Eco peripheral for testing.
///
/// # Example
///
/// ```
/// use eco_core::{Command, Driver, DriverConfig, MockClient, Thermostat};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut client = MockClient::new().with_value(eco_types::uuids::BATTERY_LEVEL, vec![77]);
/// let mut events = client.subscribe();
///
/// let thermostat = Thermostat::new();
/// let mut driver = Driver::new(client, DriverConfig::default());
/// driver.push(Command::read(thermostat.battery().clone()));
/// driver.run_until_idle(&mut events).await;
///
/// assert_eq!(thermostat.battery().value(), Some(77));
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MockClient {
    disconnected: bool,
    values: HashMap<Uuid, Vec<u8>>,
    issued: Vec<IssuedOp>,
    events: Option<EventSender>,
    reject_issue: bool,
    rejected: HashSet<Uuid>,
    nack_writes: bool,
    silent: bool,
    last_op: u64,
}

impl MockClient {
    /// A connected peripheral with no characteristics.
    pub fn new() -> Self {
        Self::default()
    }

    /// A connected peripheral holding a full Danfoss Eco characteristic set
    /// encrypted under `key`.
    ///
    /// Defaults: battery 85 %, target 21.5 °C, room 20.0 °C, manual mode,
    /// limits 5.0-28.0 °C, no errors, name "Living room", firmware "01.08",
    /// hardware "2.0".
    pub fn thermostat(key: &SecretKey) -> Result<Self> {
        let reading = TemperatureReading::from_bytes(&[43, 40])?;
        let settings = DeviceSettings::from_bytes(&[
            0x80, 10, 56, 12, 0x00, 30, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ])?;
        let clock = DeviceClock {
            local_time: 1_700_003_600,
            utc_offset: 3600,
        };
        let mut name = [0u8; DEVICE_NAME_BYTES];
        name[..11].copy_from_slice(b"Living room");

        Ok(Self::new()
            .with_value(uuids::BATTERY_LEVEL, vec![85])
            .with_value(uuids::SECRET_KEY, key.as_bytes().to_vec())
            .with_value(uuids::PIN_CODE, vec![0; 4])
            .with_value(uuids::FIRMWARE_REVISION, b"01.08".to_vec())
            .with_value(uuids::HARDWARE_REVISION, b"2.0".to_vec())
            .with_encrypted_value(uuids::TEMPERATURE, key, &reading.to_bytes())?
            .with_encrypted_value(uuids::SETTINGS, key, &settings.to_bytes())?
            .with_encrypted_value(uuids::ERRORS, key, &[0u8; 8])?
            .with_encrypted_value(uuids::CURRENT_TIME, key, &clock.to_bytes())?
            .with_encrypted_value(uuids::DEVICE_NAME, key, &name)?)
    }

    /// Store a raw value for `characteristic`, making it discoverable.
    #[must_use]
    pub fn with_value(mut self, characteristic: Uuid, value: Vec<u8>) -> Self {
        self.values.insert(characteristic, value);
        self
    }

    /// Store `plaintext` encrypted under `key`.
    pub fn with_encrypted_value(
        self,
        characteristic: Uuid,
        key: &SecretKey,
        plaintext: &[u8],
    ) -> Result<Self> {
        let value = cipher::encrypt(key, plaintext)?;
        Ok(self.with_value(characteristic, value))
    }

    /// Start out disconnected.
    #[must_use]
    pub fn disconnected(mut self) -> Self {
        self.disconnected = true;
        self
    }

    /// Create an event channel fed with completions of issued operations.
    pub fn subscribe(&mut self) -> EventReceiver {
        let (tx, rx) = event_channel();
        self.events = Some(tx);
        rx
    }

    /// Make `issue_read` / `issue_write` fail immediately.
    pub fn set_reject_issue(&mut self, reject: bool) {
        self.reject_issue = reject;
    }

    /// Make operations on `characteristic` fail immediately.
    pub fn reject_characteristic(&mut self, characteristic: Uuid) {
        self.rejected.insert(characteristic);
    }

    /// The id the next issued operation will get.
    pub fn next_op(&self) -> OpId {
        OpId::new(self.last_op + 1)
    }

    /// Push a completion as if it came from the radio.
    pub fn inject(&mut self, event: GattEvent) {
        self.emit(event);
    }

    /// Answer writes with [`GattEvent::OperationFailed`].
    pub fn set_nack_writes(&mut self, nack: bool) {
        self.nack_writes = nack;
    }

    /// Never answer issued operations.
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// Drop or restore the link. Dropping it emits [`GattEvent::Disconnected`].
    pub fn set_connected(&mut self, connected: bool) {
        let was_connected = !self.disconnected;
        self.disconnected = !connected;
        if was_connected && !connected {
            self.emit(GattEvent::Disconnected);
        }
    }

    /// Push an unsolicited notification.
    pub fn notify(&mut self, characteristic: Uuid, value: Vec<u8>) {
        self.emit(GattEvent::Notification {
            characteristic,
            value,
        });
    }

    /// Every operation issued so far, oldest first.
    pub fn issued(&self) -> &[IssuedOp] {
        &self.issued
    }

    /// The raw stored value of `characteristic`.
    pub fn raw_value(&self, characteristic: &Uuid) -> Option<Vec<u8>> {
        self.values.get(characteristic).cloned()
    }

    /// The stored value of `characteristic` decrypted under `key`.
    pub fn decrypted_value(&self, characteristic: &Uuid, key: &SecretKey) -> Result<Vec<u8>> {
        let raw = self
            .values
            .get(characteristic)
            .ok_or_else(|| Error::characteristic_not_found(characteristic))?;
        cipher::decrypt(key, raw)
    }

    fn emit(&self, event: GattEvent) {
        if self.silent {
            return;
        }
        if let Some(events) = &self.events {
            // A dropped receiver means nobody is waiting for completions.
            let _ = events.send(event);
        }
    }

    fn check_issue(&self, characteristic: &Uuid) -> Result<()> {
        if self.disconnected {
            return Err(Error::NotConnected);
        }
        if self.reject_issue || self.rejected.contains(characteristic) {
            return Err(Error::Io(std::io::Error::other(format!(
                "mock rejected operation on {characteristic}"
            ))));
        }
        Ok(())
    }

    fn allocate_op(&mut self) -> OpId {
        self.last_op += 1;
        OpId::new(self.last_op)
    }
}

impl GattClient for MockClient {
    fn is_connected(&self) -> bool {
        !self.disconnected
    }

    fn has_characteristic(&self, characteristic: &Uuid) -> bool {
        self.values.contains_key(characteristic)
    }

    fn issue_read(&mut self, characteristic: Uuid) -> Result<OpId> {
        self.check_issue(&characteristic)?;
        let op = self.allocate_op();
        self.issued.push(IssuedOp::Read(characteristic));
        let event = match self.values.get(&characteristic) {
            Some(value) => GattEvent::ReadResponse {
                op,
                characteristic,
                value: value.clone(),
            },
            None => GattEvent::OperationFailed {
                op,
                characteristic,
                reason: "attribute not found".to_string(),
            },
        };
        self.emit(event);
        Ok(op)
    }

    fn issue_write(&mut self, characteristic: Uuid, value: Vec<u8>) -> Result<OpId> {
        self.check_issue(&characteristic)?;
        let op = self.allocate_op();
        self.issued
            .push(IssuedOp::Write(characteristic, value.clone()));
        if self.nack_writes {
            self.emit(GattEvent::OperationFailed {
                op,
                characteristic,
                reason: "write not permitted".to_string(),
            });
            return Ok(op);
        }
        self.values.insert(characteristic, value);
        self.emit(GattEvent::WriteResponse { op, characteristic });
        Ok(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_auto_responds() {
        let mut client = MockClient::new().with_value(uuids::BATTERY_LEVEL, vec![50]);
        let mut events = client.subscribe();
        let op = client.issue_read(uuids::BATTERY_LEVEL).unwrap();
        assert_eq!(op, OpId::new(1));
        assert_eq!(client.next_op(), OpId::new(2));
        assert_eq!(
            events.try_recv().unwrap(),
            GattEvent::ReadResponse {
                op,
                characteristic: uuids::BATTERY_LEVEL,
                value: vec![50]
            }
        );
        assert_eq!(client.issued(), &[IssuedOp::Read(uuids::BATTERY_LEVEL)]);
    }

    #[test]
    fn test_mock_failure_injection() {
        let mut client = MockClient::new().with_value(uuids::BATTERY_LEVEL, vec![50]);
        let mut events = client.subscribe();

        client.set_reject_issue(true);
        assert!(client.issue_read(uuids::BATTERY_LEVEL).is_err());
        client.set_reject_issue(false);

        client.reject_characteristic(uuids::SETTINGS);
        assert!(matches!(
            client.issue_read(uuids::SETTINGS),
            Err(Error::Io(_))
        ));
        assert!(client.issued().is_empty());

        client.set_nack_writes(true);
        client.issue_write(uuids::BATTERY_LEVEL, vec![1]).unwrap();
        assert!(matches!(
            events.try_recv().unwrap(),
            GattEvent::OperationFailed { .. }
        ));
        assert_eq!(client.raw_value(&uuids::BATTERY_LEVEL), Some(vec![50]));

        client.set_connected(false);
        assert_eq!(events.try_recv().unwrap(), GattEvent::Disconnected);
        assert!(matches!(
            client.issue_read(uuids::BATTERY_LEVEL),
            Err(Error::NotConnected)
        ));
    }

    #[test]
    fn test_thermostat_defaults_decrypt() {
        let key = SecretKey::from_bytes(&[3; 16]).unwrap();
        let client = MockClient::thermostat(&key).unwrap();
        let plain = client.decrypted_value(&uuids::TEMPERATURE, &key).unwrap();
        assert_eq!(&plain[..2], &[43, 40]);
        let errors = client.decrypted_value(&uuids::ERRORS, &key).unwrap();
        assert!(!DeviceErrors::from_bytes(&errors).unwrap().has_problems());
    }
}

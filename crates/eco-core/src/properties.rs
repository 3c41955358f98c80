//! The Danfoss Eco property set.

use eco_types::{
    DEVICE_NAME_BYTES, DeviceClock, DeviceErrors, DeviceSettings, TemperatureReading,
    parse_battery_level, parse_device_name, parse_revision, uuids,
};
use uuid::Uuid;

use crate::cipher::SecretKey as Key;
use crate::error::Result;
use crate::property::PropertyCell;

/// [`Attribute`](crate::property::Attribute) definitions, one per characteristic.
pub mod attr {
    use super::*;
    use crate::property::{Attribute, WritableAttribute};

    /// Battery level in percent (plaintext, read-only).
    #[derive(Debug)]
    pub struct Battery;

    impl Attribute for Battery {
        type Value = u8;
        const NAME: &'static str = "battery_level";
        const CHARACTERISTIC: Uuid = uuids::BATTERY_LEVEL;
        const ENCRYPTED: bool = false;

        fn decode(data: &[u8]) -> Result<u8> {
            Ok(parse_battery_level(data)?)
        }
    }

    /// Target and room temperature.
    #[derive(Debug)]
    pub struct Temperature;

    impl Attribute for Temperature {
        type Value = TemperatureReading;
        const NAME: &'static str = "temperature";
        const CHARACTERISTIC: Uuid = uuids::TEMPERATURE;
        const ENCRYPTED: bool = true;

        fn decode(data: &[u8]) -> Result<TemperatureReading> {
            Ok(TemperatureReading::from_bytes(data)?)
        }
    }

    impl WritableAttribute for Temperature {
        fn encode(value: &TemperatureReading) -> Vec<u8> {
            value.to_bytes().to_vec()
        }
    }

    /// Limits, schedule mode and flags.
    #[derive(Debug)]
    pub struct Settings;

    impl Attribute for Settings {
        type Value = DeviceSettings;
        const NAME: &'static str = "settings";
        const CHARACTERISTIC: Uuid = uuids::SETTINGS;
        const ENCRYPTED: bool = true;

        fn decode(data: &[u8]) -> Result<DeviceSettings> {
            Ok(DeviceSettings::from_bytes(data)?)
        }
    }

    impl WritableAttribute for Settings {
        fn encode(value: &DeviceSettings) -> Vec<u8> {
            value.to_bytes().to_vec()
        }
    }

    /// Active error codes (read-only).
    #[derive(Debug)]
    pub struct Errors;

    impl Attribute for Errors {
        type Value = DeviceErrors;
        const NAME: &'static str = "errors";
        const CHARACTERISTIC: Uuid = uuids::ERRORS;
        const ENCRYPTED: bool = true;

        fn decode(data: &[u8]) -> Result<DeviceErrors> {
            Ok(DeviceErrors::from_bytes(data)?)
        }
    }

    /// User-assigned device name (read-only).
    #[derive(Debug)]
    pub struct Name;

    impl Attribute for Name {
        type Value = String;
        const NAME: &'static str = "device_name";
        const CHARACTERISTIC: Uuid = uuids::DEVICE_NAME;
        const ENCRYPTED: bool = true;

        fn decode(data: &[u8]) -> Result<String> {
            let end = data.len().min(DEVICE_NAME_BYTES);
            Ok(parse_device_name(&data[..end])?)
        }
    }

    /// Device clock.
    #[derive(Debug)]
    pub struct Clock;

    impl Attribute for Clock {
        type Value = DeviceClock;
        const NAME: &'static str = "current_time";
        const CHARACTERISTIC: Uuid = uuids::CURRENT_TIME;
        const ENCRYPTED: bool = true;

        fn decode(data: &[u8]) -> Result<DeviceClock> {
            Ok(DeviceClock::from_bytes(data)?)
        }
    }

    impl WritableAttribute for Clock {
        fn encode(value: &DeviceClock) -> Vec<u8> {
            value.to_bytes().to_vec()
        }
    }

    /// Firmware revision from the Device Information service (plaintext, read-only).
    #[derive(Debug)]
    pub struct FirmwareRevision;

    impl Attribute for FirmwareRevision {
        type Value = String;
        const NAME: &'static str = "firmware_revision";
        const CHARACTERISTIC: Uuid = uuids::FIRMWARE_REVISION;
        const ENCRYPTED: bool = false;

        fn decode(data: &[u8]) -> Result<String> {
            Ok(parse_revision(data)?)
        }
    }

    /// Hardware revision (plaintext, read-only).
    #[derive(Debug)]
    pub struct HardwareRevision;

    impl Attribute for HardwareRevision {
        type Value = String;
        const NAME: &'static str = "hardware_revision";
        const CHARACTERISTIC: Uuid = uuids::HARDWARE_REVISION;
        const ENCRYPTED: bool = false;

        fn decode(data: &[u8]) -> Result<String> {
            Ok(parse_revision(data)?)
        }
    }

    /// Session secret key (plaintext, read-only, pairing mode only).
    #[derive(Debug)]
    pub struct SecretKey;

    impl Attribute for SecretKey {
        type Value = Key;
        const NAME: &'static str = "secret_key";
        const CHARACTERISTIC: Uuid = uuids::SECRET_KEY;
        const ENCRYPTED: bool = false;

        fn decode(data: &[u8]) -> Result<Key> {
            Key::from_bytes(data)
        }
    }
}

/// Battery level property.
pub type BatteryLevel = PropertyCell<attr::Battery>;
/// Target/room temperature property.
pub type TemperatureProperty = PropertyCell<attr::Temperature>;
/// Settings property.
pub type SettingsProperty = PropertyCell<attr::Settings>;
/// Error code property.
pub type ErrorsProperty = PropertyCell<attr::Errors>;
/// Device name property.
pub type NameProperty = PropertyCell<attr::Name>;
/// Clock property.
pub type ClockProperty = PropertyCell<attr::Clock>;
/// Firmware revision property.
pub type FirmwareRevisionProperty = PropertyCell<attr::FirmwareRevision>;
/// Hardware revision property.
pub type HardwareRevisionProperty = PropertyCell<attr::HardwareRevision>;
/// Secret key property.
pub type SecretKeyProperty = PropertyCell<attr::SecretKey>;

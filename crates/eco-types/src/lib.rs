//! Platform-agnostic types for Danfoss Eco radiator thermostats.
//!
//! This crate provides the plaintext wire layouts of every Danfoss Eco
//! characteristic, so they can be decoded and encoded without a BLE stack.
//!
//! # Features
//!
//! - Decoders and encoders for each characteristic value
//! - UUID constants for the Danfoss service and standard BLE services
//! - Error types for data parsing
//!
//! # Example
//!
//! ```
//! use eco_types::TemperatureReading;
//!
//! let reading = TemperatureReading::from_bytes(&[43, 40, 0, 0, 0, 0, 0, 0]).unwrap();
//! assert_eq!(reading.target.celsius(), 21.5);
//! assert_eq!(reading.room.celsius(), 20.0);
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{
    DEVICE_NAME_BYTES, DeviceClock, DeviceErrors, DeviceSettings, ErrorCode, PinCode,
    ScheduleMode, SettingsFlags, Temperature, TemperatureReading, parse_battery_level,
    parse_device_name, parse_revision,
};
pub use uuid as uuids;

//! Core BLE library for Danfoss Eco radiator thermostats.
//!
//! A valve exposes a handful of GATT characteristics, most of them encrypted
//! with a per-device secret key. This crate models each characteristic as a
//! shared property, turns reads and writes into [`Command`]s, and runs them
//! one at a time over a single BLE link.
//!
//! # Features
//!
//! - **Property model**: cached value, staged value and read/write state per
//!   characteristic, shared between the UI side and the connection
//! - **Encrypted session**: XXTEA with the device secret key; writes and
//!   encrypted reads are refused before any traffic when no key is installed
//! - **Strict FIFO queue**: one in-flight operation, response timeout,
//!   queue drained on connection loss
//! - **Mock peripheral**: [`MockClient`] drives the whole pipeline in tests
//!
//! # Layers
//!
//! | Layer | Types |
//! |-------|-------|
//! | Properties | [`Property`], [`WritableProperty`], [`PropertyCell`], [`Thermostat`] |
//! | Commands | [`Command`], [`CommandQueue`] |
//! | Connection | [`Driver`], [`GattClient`], [`EcoDevice`] |
//!
//! # Quick Start
//!
//! ```no_run
//! use eco_core::{ConnectionConfig, EcoDevice};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConnectionConfig::new()
//!         .secret_key("00112233445566778899aabbccddeeff".parse()?);
//!     let mut device = EcoDevice::connect_with_config("eTRV", config).await?;
//!
//!     device.refresh().await;
//!     let command = device.thermostat().set_target_temperature(21.5)?;
//!     device.submit(command);
//!     device.flush().await;
//!
//!     device.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod cipher;
pub mod client;
pub mod command;
pub mod device;
pub mod driver;
pub mod error;
pub mod mock;
pub mod properties;
pub mod property;
pub mod queue;
pub mod retry;
pub mod scan;
pub mod session;
pub mod thermostat;
pub mod util;

pub use cipher::SecretKey;
pub use client::{EventReceiver, EventSender, GattClient, GattEvent, OpId, event_channel};
pub use command::{Command, CommandType, PropertyRef};
pub use device::{BleClient, ConnectionConfig, EcoDevice};
pub use driver::{Driver, DriverConfig, Outcome};
pub use error::{DeviceNotFoundReason, Error, ErrorKind, Result};
pub use mock::{IssuedOp, MockClient};
pub use property::{
    Attribute, Property, PropertyCell, PropertySnapshot, PropertyState, WritableAttribute,
    WritableProperty, WriteState,
};
pub use queue::CommandQueue;
pub use retry::{RetryConfig, with_retry};
pub use scan::{ScanOptions, find_device, find_device_with_options};
pub use session::Session;
pub use thermostat::{Thermostat, ThermostatSnapshot};
pub use util::{create_identifier, format_peripheral_id};

// Re-export from eco-types
pub use eco_types::uuids;
pub use eco_types::{
    DeviceClock, DeviceErrors, DeviceSettings, ErrorCode, PinCode, ScheduleMode,
    SettingsFlags, Temperature, TemperatureReading,
};

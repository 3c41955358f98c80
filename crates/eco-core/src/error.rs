//! Error types for eco-core.
//!
//! This module defines all error types that can occur when driving a Danfoss
//! Eco valve over Bluetooth Low Energy.
//!
//! # Error Classes
//!
//! Every error belongs to one [`ErrorKind`], which tells the caller how to
//! react:
//!
//! | Kind | Examples | Reaction |
//! |------|----------|----------|
//! | [`ErrorKind::Transport`] | [`Error::NotConnected`], [`Error::Bluetooth`], [`Error::Timeout`] | Retry the command, or reconnect |
//! | [`ErrorKind::Authentication`] | [`Error::MissingKey`] | Install a secret key first; retrying alone never helps |
//! | [`ErrorKind::MalformedResponse`] | [`Error::InvalidData`] | The cached value was kept; report it |
//! | [`ErrorKind::Capability`] | [`Error::NotWritable`] | Programming error, fix the caller |
//! | [`ErrorKind::Usage`] | [`Error::InvalidValue`], [`Error::NothingToWrite`] | Fix the input |
//!
//! Only transport errors are retried by [`crate::with_retry`].

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when communicating with Danfoss Eco devices.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Device not found during lookup.
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceNotFoundReason),

    /// Operation attempted while not connected to device.
    #[error("Not connected to device")]
    NotConnected,

    /// Required BLE characteristic not found on device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: String,
    },

    /// An operation needs the session secret key but none is installed.
    #[error("No secret key installed for this session")]
    MissingKey,

    /// A write was requested for a property that cannot be written.
    #[error("Property '{property}' is not writable")]
    NotWritable {
        /// Name of the property.
        property: &'static str,
    },

    /// A write was issued but no value was staged.
    #[error("No value staged for property '{property}'")]
    NothingToWrite {
        /// Name of the property.
        property: &'static str,
    },

    /// A read-modify-write needs a value that has not been read yet.
    #[error("Value of '{property}' is unknown; read it first")]
    ValueUnknown {
        /// Name of the property.
        property: &'static str,
    },

    /// A requested value is outside the range the device accepts.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Failed to parse or decrypt data received from device.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The device rejected a read.
    #[error("Read failed on characteristic {uuid}: {reason}")]
    ReadFailed {
        /// The characteristic UUID.
        uuid: String,
        /// The reason for the failure.
        reason: String,
    },

    /// The device rejected a write.
    #[error("Write failed to characteristic {uuid}: {reason}")]
    WriteFailed {
        /// The characteristic UUID.
        uuid: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// The connection dropped while the command was queued or in flight.
    #[error("Connection lost")]
    ConnectionLost,

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Broad error classes, used to decide between retrying, re-keying and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The radio, the link or the device failed to carry the operation.
    Transport,
    /// The session secret key is missing.
    Authentication,
    /// The device answered with a payload that could not be decoded.
    MalformedResponse,
    /// The operation is not supported by the property.
    Capability,
    /// The caller supplied an invalid request.
    Usage,
}

/// Reason why a device was not found.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum DeviceNotFoundReason {
    /// Device with specified name/address not found.
    NotFound { identifier: String },
    /// Scan timed out before finding device.
    ScanTimeout { duration: Duration },
    /// No Bluetooth adapter available.
    NoAdapter,
}

impl std::fmt::Display for DeviceNotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { identifier } => write!(f, "device '{}' not found", identifier),
            Self::ScanTimeout { duration } => write!(f, "scan timed out after {:?}", duration),
            Self::NoAdapter => write!(f, "no Bluetooth adapter available"),
        }
    }
}

impl Error {
    /// Create a device not found error for a specific identifier.
    pub fn device_not_found(identifier: impl Into<String>) -> Self {
        Self::DeviceNotFound(DeviceNotFoundReason::NotFound {
            identifier: identifier.into(),
        })
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl ToString) -> Self {
        Self::CharacteristicNotFound {
            uuid: uuid.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Bluetooth(_)
            | Error::DeviceNotFound(_)
            | Error::NotConnected
            | Error::CharacteristicNotFound { .. }
            | Error::ReadFailed { .. }
            | Error::WriteFailed { .. }
            | Error::Timeout { .. }
            | Error::ConnectionLost
            | Error::Io(_) => ErrorKind::Transport,
            Error::MissingKey => ErrorKind::Authentication,
            Error::InvalidData(_) => ErrorKind::MalformedResponse,
            Error::NotWritable { .. } => ErrorKind::Capability,
            Error::NothingToWrite { .. }
            | Error::ValueUnknown { .. }
            | Error::InvalidValue(_)
            | Error::InvalidConfig(_) => ErrorKind::Usage,
        }
    }
}

impl From<eco_types::ParseError> for Error {
    fn from(err: eco_types::ParseError) -> Self {
        match err {
            eco_types::ParseError::InsufficientBytes { expected, actual } => Error::InvalidData(
                format!("expected at least {expected} bytes, got {actual}"),
            ),
            eco_types::ParseError::InvalidValue(msg) => Error::InvalidData(msg),
            // Handle future ParseError variants (non_exhaustive)
            _ => Error::InvalidData(format!("Parse error: {}", err)),
        }
    }
}

/// Result type alias using eco-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

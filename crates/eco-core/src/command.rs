//! A single unit of work for the command queue.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::client::{GattClient, OpId};
use crate::error::{Error, Result};
use crate::property::{Property, WritableProperty};
use crate::session::Session;

/// Operation kind of a [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    /// Read the characteristic and decode its value.
    Read,
    /// Write the staged value.
    Write,
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandType::Read => write!(f, "read"),
            CommandType::Write => write!(f, "write"),
        }
    }
}

/// A property handle whose write capability is only known at runtime.
#[derive(Debug, Clone)]
pub enum PropertyRef {
    /// A property without write support.
    ReadOnly(Arc<dyn Property>),
    /// A property with write support.
    Writable(Arc<dyn WritableProperty>),
}

impl PropertyRef {
    /// The referenced property.
    pub fn property(&self) -> &dyn Property {
        match self {
            PropertyRef::ReadOnly(p) => p.as_ref(),
            PropertyRef::Writable(p) => p.as_ref(),
        }
    }
}

/// A read or write bound to a shared property.
///
/// A write can only be built over a [`WritableProperty`], so a write command
/// always has a write path to dispatch to.
#[derive(Debug, Clone)]
pub enum Command {
    /// Read the property.
    Read(Arc<dyn Property>),
    /// Write the property's staged value.
    Write(Arc<dyn WritableProperty>),
}

impl Command {
    /// A read of `property`.
    pub fn read(property: Arc<dyn Property>) -> Self {
        Command::Read(property)
    }

    /// A write of the value staged on `property`.
    pub fn write(property: Arc<dyn WritableProperty>) -> Self {
        Command::Write(property)
    }

    /// Build a command from a runtime operation kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotWritable`] for a write over a read-only property.
    ///
    /// ```
    /// use std::sync::Arc;
    /// use eco_core::{Command, CommandType, Error, PropertyRef};
    /// use eco_core::properties::BatteryLevel;
    ///
    /// let battery = PropertyRef::ReadOnly(Arc::new(BatteryLevel::new()));
    /// let err = Command::new(CommandType::Write, battery).unwrap_err();
    /// assert!(matches!(err, Error::NotWritable { property: "battery_level" }));
    /// ```
    pub fn new(kind: CommandType, property: PropertyRef) -> Result<Self> {
        match (kind, property) {
            (CommandType::Read, PropertyRef::ReadOnly(p)) => Ok(Command::Read(p)),
            (CommandType::Read, PropertyRef::Writable(p)) => Ok(Command::Read(p)),
            (CommandType::Write, PropertyRef::Writable(p)) => Ok(Command::Write(p)),
            (CommandType::Write, PropertyRef::ReadOnly(p)) => Err(Error::NotWritable {
                property: p.name(),
            }),
        }
    }

    /// The operation kind.
    pub fn kind(&self) -> CommandType {
        match self {
            Command::Read(_) => CommandType::Read,
            Command::Write(_) => CommandType::Write,
        }
    }

    /// The property the command operates on.
    pub fn property(&self) -> &dyn Property {
        match self {
            Command::Read(p) => p.as_ref(),
            Command::Write(p) => p.as_ref(),
        }
    }

    /// Issue the command against `client`.
    ///
    /// `Ok(id)` means the operation is in flight as `id`; its completion must
    /// be fed back through [`Command::complete`] or [`Command::fail`].
    pub fn execute(&self, client: &mut dyn GattClient, session: &Session) -> Result<OpId> {
        match self {
            Command::Read(p) => p.read_request(client, session),
            Command::Write(p) => p.write_request(client, session),
        }
    }

    /// Finish a read with the received payload, or a write with its acknowledgement.
    pub fn complete(&self, payload: Option<&[u8]>, session: &Session) -> Result<()> {
        match (self, payload) {
            (Command::Read(p), Some(payload)) => p.handle_response(payload, session),
            (Command::Read(p), None) => {
                p.read_failed();
                Err(Error::InvalidData(format!("empty response for {}", p.name())))
            }
            (Command::Write(p), _) => {
                p.handle_ack();
                Ok(())
            }
        }
    }

    /// The in-flight operation failed or timed out.
    pub fn fail(&self) {
        match self {
            Command::Read(p) => p.read_failed(),
            Command::Write(p) => p.write_failed(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.property().name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{IssuedOp, MockClient};
    use crate::properties::{BatteryLevel, TemperatureProperty};
    use crate::property::{PropertyState, WriteState};
    use eco_types::{Temperature, TemperatureReading, uuids};

    #[test]
    fn test_read_over_writable_property() {
        let temperature = Arc::new(TemperatureProperty::new());
        let command = Command::new(CommandType::Read, PropertyRef::Writable(temperature)).unwrap();
        assert_eq!(command.kind(), CommandType::Read);
        assert_eq!(command.to_string(), "read temperature");
    }

    #[test]
    fn test_write_over_read_only_is_rejected() {
        let result = Command::new(
            CommandType::Write,
            PropertyRef::ReadOnly(Arc::new(BatteryLevel::new())),
        );
        assert!(matches!(
            result,
            Err(Error::NotWritable {
                property: "battery_level"
            })
        ));
    }

    #[test]
    fn test_execute_dispatches_by_kind() {
        let key = crate::SecretKey::from_bytes(&[5; 16]).unwrap();
        let mut client = MockClient::thermostat(&key).unwrap();
        let session = Session::with_key(key);

        let battery = Arc::new(BatteryLevel::new());
        let read = Command::read(battery.clone())
            .execute(&mut client, &session)
            .unwrap();
        assert_eq!(battery.state(), PropertyState::AwaitingResponse);

        let temperature = Arc::new(TemperatureProperty::new());
        temperature.stage(TemperatureReading {
            target: Temperature::from_raw(40),
            room: Temperature::from_raw(0),
        });
        let write = Command::write(temperature.clone())
            .execute(&mut client, &session)
            .unwrap();
        assert_eq!(temperature.write_state(), WriteState::Pending);
        assert!(write > read);

        assert_eq!(client.issued()[0], IssuedOp::Read(uuids::BATTERY_LEVEL));
        assert!(matches!(client.issued()[1], IssuedOp::Write(c, _) if c == uuids::TEMPERATURE));
    }

    #[test]
    fn test_complete_and_fail() {
        let battery = Arc::new(BatteryLevel::new());
        let command = Command::read(battery.clone());
        command.complete(Some(&[42]), &Session::new()).unwrap();
        assert_eq!(battery.value(), Some(42));

        command.fail();
        assert_eq!(battery.state(), PropertyState::Stale);
        assert_eq!(battery.value(), Some(42));
    }
}

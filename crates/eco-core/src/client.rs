//! The BLE client seam the command layer issues operations against.
//!
//! A [`GattClient`] only *issues* operations. Their completions arrive later
//! as [`GattEvent`]s on an event channel, tagged with the [`OpId`] returned
//! when the operation was issued. The [`crate::Driver`] pairs them with its
//! in-flight command by that id.

use std::fmt;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;

/// Sequence number of one issued operation.
///
/// Clients hand out increasing ids, so a completion that arrives after its
/// operation was abandoned never matches a later operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(u64);

impl OpId {
    /// Create from a raw sequence number.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw sequence number.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// The id following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Non-blocking access to the characteristics of one connected peripheral.
pub trait GattClient: Send {
    /// Whether the link is currently up.
    fn is_connected(&self) -> bool;

    /// Whether service discovery found `characteristic`.
    fn has_characteristic(&self, characteristic: &Uuid) -> bool;

    /// Start a characteristic read. The value arrives as
    /// [`GattEvent::ReadResponse`] carrying the returned id.
    fn issue_read(&mut self, characteristic: Uuid) -> Result<OpId>;

    /// Start a characteristic write. Completion arrives as
    /// [`GattEvent::WriteResponse`] carrying the returned id.
    fn issue_write(&mut self, characteristic: Uuid, value: Vec<u8>) -> Result<OpId>;
}

/// Completion or unsolicited event from the peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattEvent {
    /// A read finished with `value`.
    ReadResponse {
        /// The read this answers.
        op: OpId,
        /// Characteristic that was read.
        characteristic: Uuid,
        /// Raw (possibly encrypted) value.
        value: Vec<u8>,
    },
    /// The peripheral pushed a new value.
    Notification {
        /// Characteristic that changed.
        characteristic: Uuid,
        /// Raw (possibly encrypted) value.
        value: Vec<u8>,
    },
    /// A write was acknowledged.
    WriteResponse {
        /// The write this acknowledges.
        op: OpId,
        /// Characteristic that was written.
        characteristic: Uuid,
    },
    /// A read or write was rejected by the peripheral or the stack.
    OperationFailed {
        /// The operation that failed.
        op: OpId,
        /// Characteristic the operation targeted.
        characteristic: Uuid,
        /// Description of the failure.
        reason: String,
    },
    /// The link went down.
    Disconnected,
}

impl GattEvent {
    /// Characteristic the event refers to, if any.
    pub fn characteristic(&self) -> Option<Uuid> {
        match self {
            GattEvent::ReadResponse { characteristic, .. }
            | GattEvent::Notification { characteristic, .. }
            | GattEvent::WriteResponse { characteristic, .. }
            | GattEvent::OperationFailed { characteristic, .. } => Some(*characteristic),
            GattEvent::Disconnected => None,
        }
    }

    /// The operation the event completes. Notifications and disconnects
    /// complete none.
    pub fn op(&self) -> Option<OpId> {
        match self {
            GattEvent::ReadResponse { op, .. }
            | GattEvent::WriteResponse { op, .. }
            | GattEvent::OperationFailed { op, .. } => Some(*op),
            GattEvent::Notification { .. } | GattEvent::Disconnected => None,
        }
    }
}

/// Sending half of a [`GattEvent`] channel.
pub type EventSender = mpsc::UnboundedSender<GattEvent>;

/// Receiving half of a [`GattEvent`] channel.
pub type EventReceiver = mpsc::UnboundedReceiver<GattEvent>;

/// Create a new event channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;
    use eco_types::uuids;

    #[test]
    fn test_event_op() {
        let op = OpId::new(7);
        assert_eq!(op.next().raw(), 8);
        assert_eq!(op.to_string(), "#7");

        let failed = GattEvent::OperationFailed {
            op,
            characteristic: uuids::SETTINGS,
            reason: "nack".to_string(),
        };
        assert_eq!(failed.op(), Some(op));
        assert_eq!(failed.characteristic(), Some(uuids::SETTINGS));

        let notification = GattEvent::Notification {
            characteristic: uuids::TEMPERATURE,
            value: vec![0; 8],
        };
        assert_eq!(notification.op(), None);
        assert_eq!(GattEvent::Disconnected.op(), None);
    }
}

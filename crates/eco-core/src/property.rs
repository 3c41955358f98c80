//! The property contract driven by [`Command`](crate::Command).
//!
//! A property owns the cached value of one characteristic and knows how to
//! request it, decode the response and, for writable properties, encode and
//! confirm a new value. Properties are shared (`Arc`) between the commands
//! that reference them and the caller reading values back, so all state sits
//! behind interior mutability.
//!
//! # State machine
//!
//! ```text
//! Unknown ──read issued──▶ AwaitingResponse ──valid payload──▶ Valid
//!                                 │
//!                                 └─malformed / failed / timeout──▶ Stale (had a value)
//!                                                                  Unknown (never had one)
//!
//! Valid ──write issued──▶ AwaitingAck ──ack──▶ Valid(new value)
//!                              └──nack / timeout──▶ previous state, old value
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::client::{GattClient, OpId};
use crate::error::{Error, Result};
use crate::session::Session;

/// Read-side state of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyState {
    /// No value has been decoded yet.
    #[default]
    Unknown,
    /// A read was issued and its response has not arrived.
    AwaitingResponse,
    /// A write was issued and its acknowledgement has not arrived.
    AwaitingAck,
    /// The cached value reflects the last response.
    Valid,
    /// The last refresh failed; the cached value is from an earlier response.
    Stale,
}

/// Write-side state of a writable property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteState {
    /// No write has been issued.
    #[default]
    None,
    /// A write was issued and awaits acknowledgement.
    Pending,
    /// The last write was acknowledged.
    Confirmed,
    /// The last write was rejected or timed out.
    Failed,
}

/// One readable device attribute.
pub trait Property: Send + Sync + fmt::Debug {
    /// Stable snake_case name, used in logs and outcomes.
    fn name(&self) -> &'static str;

    /// Characteristic carrying the value.
    fn characteristic(&self) -> Uuid;

    /// Whether the value is encrypted with the session key.
    fn is_encrypted(&self) -> bool;

    /// Current read-side state.
    fn state(&self) -> PropertyState;

    /// Issue a read of the characteristic.
    ///
    /// `Ok(id)` means the read was handed to the radio as operation `id`, not
    /// that a value arrived. On error nothing was sent and the property is
    /// unchanged.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`], [`Error::CharacteristicNotFound`],
    /// [`Error::MissingKey`] for encrypted properties without a key, or the
    /// client's transport error.
    fn read_request(&self, client: &mut dyn GattClient, session: &Session) -> Result<OpId>;

    /// Decode a read response or notification payload.
    ///
    /// A payload that fails to decrypt or decode leaves the cached value
    /// untouched and marks the property stale.
    fn handle_response(&self, payload: &[u8], session: &Session) -> Result<()>;

    /// The outstanding read failed or timed out.
    fn read_failed(&self);
}

/// A property that can also be written.
pub trait WritableProperty: Property {
    /// Current write-side state.
    fn write_state(&self) -> WriteState;

    /// Encode, encrypt and issue a write of the staged value.
    ///
    /// Returns the id of the issued write. On error nothing was sent and the
    /// property is unchanged.
    ///
    /// # Errors
    ///
    /// [`Error::MissingKey`] (checked before anything else),
    /// [`Error::NotConnected`], [`Error::CharacteristicNotFound`],
    /// [`Error::NothingToWrite`], or the client's transport error.
    fn write_request(&self, client: &mut dyn GattClient, session: &Session) -> Result<OpId>;

    /// The outstanding write was acknowledged.
    fn handle_ack(&self);

    /// The outstanding write was rejected or timed out.
    fn write_failed(&self);
}

/// Static description of one characteristic and its plaintext codec.
pub trait Attribute: Send + Sync + 'static {
    /// Decoded value type.
    type Value: Clone + fmt::Debug + Send + Sync + 'static;

    /// Property name.
    const NAME: &'static str;

    /// Characteristic UUID.
    const CHARACTERISTIC: Uuid;

    /// Whether payloads are encrypted with the session key.
    const ENCRYPTED: bool;

    /// Decode a plaintext payload.
    fn decode(data: &[u8]) -> Result<Self::Value>;
}

/// An [`Attribute`] that can be written.
pub trait WritableAttribute: Attribute {
    /// Encode a value as a plaintext payload.
    fn encode(value: &Self::Value) -> Vec<u8>;
}

struct Slot<V> {
    value: Option<V>,
    staged: Option<V>,
    /// Bumped on every `stage`, so a write only clears the value it sent.
    staged_rev: u64,
    in_flight: Option<V>,
    state: PropertyState,
    state_before_write: PropertyState,
    write_state: WriteState,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self {
            value: None,
            staged: None,
            staged_rev: 0,
            in_flight: None,
            state: PropertyState::Unknown,
            state_before_write: PropertyState::Unknown,
            write_state: WriteState::None,
        }
    }
}

impl<V> Slot<V> {
    fn refresh_failed(&mut self) {
        self.state = if self.value.is_some() {
            PropertyState::Stale
        } else {
            PropertyState::Unknown
        };
    }
}

/// Cached value and request state for one [`Attribute`].
pub struct PropertyCell<A: Attribute> {
    slot: Mutex<Slot<A::Value>>,
    _attribute: PhantomData<fn() -> A>,
}

impl<A: Attribute> Default for PropertyCell<A> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(Slot::default()),
            _attribute: PhantomData,
        }
    }
}

impl<A: Attribute> PropertyCell<A> {
    /// An empty property in the [`PropertyState::Unknown`] state.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot<A::Value>> {
        // Slot updates never panic mid-way, so a poisoned lock still holds consistent data.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The last decoded or confirmed value.
    pub fn value(&self) -> Option<A::Value> {
        self.lock().value.clone()
    }

    /// The value staged for the next write.
    pub fn staged(&self) -> Option<A::Value> {
        self.lock().staged.clone()
    }

    /// The value of the outstanding write.
    pub fn in_flight(&self) -> Option<A::Value> {
        self.lock().in_flight.clone()
    }

    fn check_link(client: &dyn GattClient) -> Result<()> {
        if !client.is_connected() {
            return Err(Error::NotConnected);
        }
        if !client.has_characteristic(&A::CHARACTERISTIC) {
            return Err(Error::characteristic_not_found(A::CHARACTERISTIC));
        }
        Ok(())
    }
}

impl<A: WritableAttribute> PropertyCell<A> {
    /// Stage `value` for the next write command.
    pub fn stage(&self, value: A::Value) {
        debug!(property = A::NAME, ?value, "Staged write");
        let mut slot = self.lock();
        slot.staged = Some(value);
        slot.staged_rev = slot.staged_rev.wrapping_add(1);
    }
}

impl<A: Attribute> fmt::Debug for PropertyCell<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.lock();
        f.debug_struct("PropertyCell")
            .field("name", &A::NAME)
            .field("state", &slot.state)
            .field("write_state", &slot.write_state)
            .field("value", &slot.value)
            .finish_non_exhaustive()
    }
}

impl<A: Attribute> Property for PropertyCell<A> {
    fn name(&self) -> &'static str {
        A::NAME
    }

    fn characteristic(&self) -> Uuid {
        A::CHARACTERISTIC
    }

    fn is_encrypted(&self) -> bool {
        A::ENCRYPTED
    }

    fn state(&self) -> PropertyState {
        self.lock().state
    }

    fn read_request(&self, client: &mut dyn GattClient, session: &Session) -> Result<OpId> {
        Self::check_link(client)?;
        if A::ENCRYPTED {
            session.key()?;
        }
        let op = client.issue_read(A::CHARACTERISTIC)?;
        self.lock().state = PropertyState::AwaitingResponse;
        debug!(property = A::NAME, %op, "Read issued");
        Ok(op)
    }

    fn handle_response(&self, payload: &[u8], session: &Session) -> Result<()> {
        let decoded = if A::ENCRYPTED {
            session.decrypt(payload).and_then(|plain| A::decode(&plain))
        } else {
            A::decode(payload)
        };

        let mut slot = self.lock();
        match decoded {
            Ok(value) => {
                debug!(property = A::NAME, ?value, "Value updated");
                slot.value = Some(value);
                slot.state = PropertyState::Valid;
                Ok(())
            }
            Err(e) => {
                warn!(property = A::NAME, error = %e, "Rejected payload");
                slot.refresh_failed();
                Err(e)
            }
        }
    }

    fn read_failed(&self) {
        self.lock().refresh_failed();
    }
}

impl<A: WritableAttribute> WritableProperty for PropertyCell<A> {
    fn write_state(&self) -> WriteState {
        self.lock().write_state
    }

    fn write_request(&self, client: &mut dyn GattClient, session: &Session) -> Result<OpId> {
        let key = session.key()?;
        Self::check_link(client)?;

        let (staged, rev) = {
            let slot = self.lock();
            let staged = slot
                .staged
                .clone()
                .ok_or(Error::NothingToWrite { property: A::NAME })?;
            (staged, slot.staged_rev)
        };
        let plaintext = A::encode(&staged);
        let payload = if A::ENCRYPTED {
            crate::cipher::encrypt(key, &plaintext)?
        } else {
            plaintext
        };
        // The client may call back into this property, so the lock is not held here.
        let op = client.issue_write(A::CHARACTERISTIC, payload)?;

        let mut slot = self.lock();
        if slot.staged_rev == rev {
            slot.staged = None;
        }
        slot.in_flight = Some(staged);
        slot.state_before_write = slot.state;
        slot.state = PropertyState::AwaitingAck;
        slot.write_state = WriteState::Pending;
        debug!(property = A::NAME, %op, "Write issued");
        Ok(op)
    }

    fn handle_ack(&self) {
        let mut slot = self.lock();
        if slot.write_state != WriteState::Pending {
            debug!(property = A::NAME, "Ignoring acknowledgement without pending write");
            return;
        }
        if let Some(value) = slot.in_flight.take() {
            slot.value = Some(value);
        }
        slot.state = PropertyState::Valid;
        slot.write_state = WriteState::Confirmed;
        debug!(property = A::NAME, "Write confirmed");
    }

    fn write_failed(&self) {
        let mut slot = self.lock();
        if slot.write_state != WriteState::Pending {
            return;
        }
        slot.in_flight = None;
        slot.state = slot.state_before_write;
        slot.write_state = WriteState::Failed;
        warn!(property = A::NAME, "Write failed; keeping previous value");
    }
}

/// Serialisable view of one property.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertySnapshot<V> {
    /// Last decoded or confirmed value.
    pub value: Option<V>,
    /// Read-side state.
    pub state: PropertyState,
}

impl<A: Attribute> PropertyCell<A> {
    /// Copy out the value and state together.
    pub fn snapshot(&self) -> PropertySnapshot<A::Value> {
        let slot = self.lock();
        PropertySnapshot {
            value: slot.value.clone(),
            state: slot.state,
        }
    }
}

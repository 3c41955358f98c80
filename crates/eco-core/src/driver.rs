//! The connection driver: one in-flight GATT operation at a time.
//!
//! [`Driver`] owns the client, the [`CommandQueue`] and the [`Session`]. It
//! pops a command, issues it, and holds it in a single in-flight slot until
//! the matching [`GattEvent`] arrives or the response timeout expires. Only
//! then is the next command popped.
//!
//! Completions are matched by the [`OpId`] the client returned when the
//! command was issued, so a late answer to a timed-out command is dropped
//! instead of settling whatever took its place. A notification carries no
//! id and only completes an in-flight read of the same characteristic.
//!
//! Failed commands are reported as [`Outcome::Rejected`] or
//! [`Outcome::Failed`] and dropped; re-pushing them is up to the caller.

use std::time::Duration;

use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::cipher::SecretKey;
use crate::client::{EventReceiver, GattClient, GattEvent, OpId};
use crate::command::{Command, CommandType};
use crate::error::{Error, ErrorKind};
use crate::queue::CommandQueue;
use crate::session::Session;

/// Default time to wait for a response before failing the in-flight command.
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// How long an issued command may wait for its completion event.
    pub response_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }
}

impl DriverConfig {
    /// Create a new driver config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the response timeout.
    #[must_use]
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }
}

/// How a command settled.
#[derive(Debug)]
pub enum Outcome {
    /// The read decoded a value, or the write was acknowledged.
    Updated {
        /// Property name.
        property: &'static str,
        /// Operation kind.
        kind: CommandType,
    },
    /// The command could not be issued; nothing was sent.
    Rejected {
        /// Property name.
        property: &'static str,
        /// Operation kind.
        kind: CommandType,
        /// Why issuing failed.
        error: Error,
    },
    /// The command was sent (or queued) but did not complete.
    Failed {
        /// Property name.
        property: &'static str,
        /// Operation kind.
        kind: CommandType,
        /// Why it failed.
        error: Error,
    },
}

impl Outcome {
    /// Property name.
    pub fn property(&self) -> &'static str {
        match self {
            Outcome::Updated { property, .. }
            | Outcome::Rejected { property, .. }
            | Outcome::Failed { property, .. } => property,
        }
    }

    /// Operation kind.
    pub fn kind(&self) -> CommandType {
        match self {
            Outcome::Updated { kind, .. }
            | Outcome::Rejected { kind, .. }
            | Outcome::Failed { kind, .. } => *kind,
        }
    }

    /// The error, unless the command succeeded.
    pub fn error(&self) -> Option<&Error> {
        match self {
            Outcome::Updated { .. } => None,
            Outcome::Rejected { error, .. } | Outcome::Failed { error, .. } => Some(error),
        }
    }

    /// Take the error out, unless the command succeeded.
    pub fn into_error(self) -> Option<Error> {
        match self {
            Outcome::Updated { .. } => None,
            Outcome::Rejected { error, .. } | Outcome::Failed { error, .. } => Some(error),
        }
    }

    /// Whether the command succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Updated { .. })
    }
}

#[derive(Debug)]
struct InFlight {
    command: Command,
    op: OpId,
    deadline: Instant,
}

impl InFlight {
    fn owns(&self, event: &GattEvent) -> bool {
        let characteristic = self.command.property().characteristic();
        if event.characteristic() != Some(characteristic) {
            return false;
        }
        match event {
            GattEvent::Notification { .. } => self.command.kind() == CommandType::Read,
            _ => event.op() == Some(self.op),
        }
    }
}

/// Serialises commands onto one [`GattClient`].
#[derive(Debug)]
pub struct Driver<C: GattClient> {
    client: C,
    queue: CommandQueue,
    session: Session,
    in_flight: Option<InFlight>,
    config: DriverConfig,
    outcomes: Vec<Outcome>,
}

impl<C: GattClient> Driver<C> {
    /// A driver with an empty queue and no key installed.
    pub fn new(client: C, config: DriverConfig) -> Self {
        Self {
            client,
            queue: CommandQueue::new(),
            session: Session::new(),
            in_flight: None,
            config,
            outcomes: Vec::new(),
        }
    }

    /// The underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Mutable access to the underlying client.
    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    /// The session key state.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The queue of waiting commands.
    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// The current configuration.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Install the session key used by encrypted reads and all writes.
    pub fn install_key(&mut self, key: SecretKey) {
        self.session.install(key);
    }

    /// Discard the session key.
    pub fn clear_key(&mut self) {
        self.session.clear();
    }

    /// Append a command to the queue. It is issued by the next [`Driver::dispatch`].
    pub fn push(&mut self, command: Command) {
        debug!(%command, queued = self.queue.len() + 1, "Command queued");
        self.queue.push(command);
    }

    /// The command currently awaiting its completion.
    pub fn in_flight(&self) -> Option<&Command> {
        self.in_flight.as_ref().map(|f| &f.command)
    }

    /// Id of the in-flight operation.
    pub fn in_flight_op(&self) -> Option<OpId> {
        self.in_flight.as_ref().map(|f| f.op)
    }

    /// Deadline of the in-flight command.
    pub fn deadline(&self) -> Option<Instant> {
        self.in_flight.as_ref().map(|f| f.deadline)
    }

    /// Whether nothing is in flight and nothing is queued.
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.queue.is_empty()
    }

    /// Take the outcomes recorded since the last call.
    pub fn take_outcomes(&mut self) -> Vec<Outcome> {
        std::mem::take(&mut self.outcomes)
    }

    /// Issue queued commands until one is in flight.
    ///
    /// Commands that fail to issue are reported as [`Outcome::Rejected`] and
    /// dropped. A not-connected failure is handled as a lost connection.
    /// Returns whether a command is in flight afterwards.
    pub fn dispatch(&mut self) -> bool {
        if self.in_flight.is_some() {
            return true;
        }
        while let Some(command) = self.queue.pop() {
            match command.execute(&mut self.client, &self.session) {
                Ok(op) => {
                    debug!(%command, %op, "Command in flight");
                    self.in_flight = Some(InFlight {
                        command,
                        op,
                        deadline: Instant::now() + self.config.response_timeout,
                    });
                    return true;
                }
                Err(Error::NotConnected) => {
                    self.record_rejected(&command, Error::NotConnected);
                    self.connection_lost();
                    return false;
                }
                Err(error) => {
                    if error.kind() == ErrorKind::Authentication {
                        warn!(%command, "Install a secret key before issuing this command");
                    }
                    self.record_rejected(&command, error);
                }
            }
        }
        false
    }

    /// Feed an event from the peripheral.
    ///
    /// Events that do not belong to the in-flight operation are ignored,
    /// including late completions of operations that already timed out.
    /// When the in-flight command settles, the next one is dispatched.
    pub fn handle_event(&mut self, event: GattEvent) {
        if event == GattEvent::Disconnected {
            self.connection_lost();
            return;
        }

        let Some(in_flight) = &self.in_flight else {
            debug!(?event, "Ignoring event with nothing in flight");
            return;
        };
        let command = &in_flight.command;
        if !in_flight.owns(&event) {
            debug!(?event, %command, op = %in_flight.op, "Ignoring unrelated event");
            return;
        }

        let settled = match (command.kind(), event) {
            (CommandType::Read, GattEvent::ReadResponse { value, .. })
            | (CommandType::Read, GattEvent::Notification { value, .. }) => {
                Some(command.complete(Some(&value), &self.session))
            }
            (CommandType::Write, GattEvent::WriteResponse { .. }) => {
                Some(command.complete(None, &self.session))
            }
            (kind, GattEvent::OperationFailed { characteristic, reason, .. }) => {
                command.fail();
                let uuid = characteristic.to_string();
                Some(Err(match kind {
                    CommandType::Read => Error::ReadFailed { uuid, reason },
                    CommandType::Write => Error::WriteFailed { uuid, reason },
                }))
            }
            (_, event) => {
                debug!(?event, %command, "Ignoring event of the wrong kind");
                None
            }
        };

        if let Some(result) = settled {
            if let Some(in_flight) = self.in_flight.take() {
                self.record_settled(&in_flight.command, result);
            }
            self.dispatch();
        }
    }

    /// Fail the in-flight command if its deadline has passed.
    ///
    /// Returns whether a command timed out.
    pub fn poll_timeout(&mut self, now: Instant) -> bool {
        let expired = self.in_flight.as_ref().is_some_and(|f| f.deadline <= now);
        if !expired {
            return false;
        }
        if let Some(in_flight) = self.in_flight.take() {
            let command = in_flight.command;
            warn!(%command, timeout = ?self.config.response_timeout, "Command timed out");
            command.fail();
            let error = Error::timeout(command.to_string(), self.config.response_timeout);
            self.record_settled(&command, Err(error));
        }
        self.dispatch();
        true
    }

    /// Tear down after the link dropped.
    ///
    /// Fails the in-flight command, drains the queue and clears the key.
    pub fn connection_lost(&mut self) {
        let dropped = self.queue.len() + usize::from(self.in_flight.is_some());
        info!(dropped, "Connection lost; draining command queue");

        if let Some(in_flight) = self.in_flight.take() {
            in_flight.command.fail();
            self.record_settled(&in_flight.command, Err(Error::ConnectionLost));
        }
        let drained: Vec<Command> = self.queue.drain().collect();
        for command in drained {
            self.outcomes.push(Outcome::Failed {
                property: command.property().name(),
                kind: command.kind(),
                error: Error::ConnectionLost,
            });
        }
        self.session.clear();
    }

    /// Dispatch and process events until the queue is empty and nothing is in flight.
    ///
    /// Returns the outcomes of every command that settled. A closed event
    /// channel is treated as a lost connection.
    pub async fn run_until_idle(&mut self, events: &mut EventReceiver) -> Vec<Outcome> {
        self.dispatch();
        while let Some(deadline) = self.deadline() {
            match timeout_at(deadline, events.recv()).await {
                Ok(Some(event)) => self.handle_event(event),
                Ok(None) => {
                    warn!("Event channel closed");
                    self.connection_lost();
                }
                Err(_) => {
                    self.poll_timeout(Instant::now());
                }
            }
        }
        self.take_outcomes()
    }

    fn record_rejected(&mut self, command: &Command, error: Error) {
        warn!(%command, error = %error, "Command could not be issued");
        self.outcomes.push(Outcome::Rejected {
            property: command.property().name(),
            kind: command.kind(),
            error,
        });
    }

    fn record_settled(&mut self, command: &Command, result: crate::Result<()>) {
        let property = command.property().name();
        let kind = command.kind();
        match result {
            Ok(()) => {
                debug!(%command, "Command completed");
                self.outcomes.push(Outcome::Updated { property, kind });
            }
            Err(error) => {
                warn!(%command, error = %error, "Command failed");
                self.outcomes.push(Outcome::Failed {
                    property,
                    kind,
                    error,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockClient;
    use crate::property::{Property, PropertyState, WritableProperty, WriteState};
    use crate::thermostat::Thermostat;
    use eco_types::uuids;

    fn key() -> SecretKey {
        SecretKey::from_bytes(&[0x11; 16]).unwrap()
    }

    fn keyed_driver() -> (Driver<MockClient>, EventReceiver) {
        let mut client = MockClient::thermostat(&key()).unwrap();
        let events = client.subscribe();
        let mut driver = Driver::new(client, DriverConfig::default());
        driver.install_key(key());
        (driver, events)
    }

    #[test]
    fn test_single_command_in_flight() {
        let (mut driver, _events) = keyed_driver();
        let thermostat = Thermostat::new();
        for command in thermostat.poll_commands() {
            driver.push(command);
        }
        assert!(driver.dispatch());
        assert_eq!(driver.client().issued().len(), 1);
        // Without a completion, dispatching again issues nothing new.
        assert!(driver.dispatch());
        assert_eq!(driver.client().issued().len(), 1);
    }

    #[test]
    fn test_events_settle_in_order() {
        let (mut driver, mut events) = keyed_driver();
        let thermostat = Thermostat::new();
        driver.push(Command::read(thermostat.battery().clone()));
        driver.push(Command::read(thermostat.temperature().clone()));
        driver.dispatch();

        while let Ok(event) = events.try_recv() {
            driver.handle_event(event);
        }
        assert!(driver.is_idle());
        assert_eq!(thermostat.battery().value(), Some(85));
        assert_eq!(
            thermostat.temperature().value().map(|t| t.target.celsius()),
            Some(21.5)
        );
        let outcomes = driver.take_outcomes();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(Outcome::is_success));
        assert_eq!(outcomes[0].property(), "battery_level");
    }

    #[test]
    fn test_unrelated_event_is_ignored() {
        let (mut driver, _events) = keyed_driver();
        let thermostat = Thermostat::new();
        driver.push(Command::read(thermostat.battery().clone()));
        driver.dispatch();
        let op = driver.in_flight_op().unwrap();

        driver.handle_event(GattEvent::ReadResponse {
            op,
            characteristic: uuids::ERRORS,
            value: vec![0; 8],
        });
        driver.handle_event(GattEvent::WriteResponse {
            op,
            characteristic: uuids::BATTERY_LEVEL,
        });
        assert!(driver.in_flight().is_some());
        assert!(driver.take_outcomes().is_empty());
    }

    #[test]
    fn test_late_failure_does_not_settle_next_write() {
        let (mut driver, mut events) = keyed_driver();
        let thermostat = Thermostat::new();
        driver.push(Command::read(thermostat.temperature().clone()));
        driver.dispatch();
        driver.handle_event(events.try_recv().unwrap());

        driver.client_mut().set_silent(true);
        driver.push(Command::read(thermostat.temperature().clone()));
        driver.dispatch();
        let timed_out = driver.in_flight_op().unwrap();
        assert!(driver.poll_timeout(driver.deadline().unwrap()));

        driver.client_mut().set_silent(false);
        driver.push(thermostat.set_target_temperature(24.0).unwrap());
        driver.dispatch();
        assert_ne!(driver.in_flight_op(), Some(timed_out));

        driver.handle_event(GattEvent::OperationFailed {
            op: timed_out,
            characteristic: uuids::TEMPERATURE,
            reason: "late".to_string(),
        });
        let temperature = thermostat.temperature();
        assert_eq!(driver.in_flight().map(Command::kind), Some(CommandType::Write));
        assert_eq!(temperature.write_state(), WriteState::Pending);

        driver.handle_event(events.try_recv().unwrap());
        assert!(driver.is_idle());
        assert_eq!(temperature.write_state(), WriteState::Confirmed);
        assert_eq!(temperature.value().map(|t| t.target.celsius()), Some(24.0));
        let outcomes = driver.take_outcomes();
        assert_eq!(outcomes.len(), 3);
        assert!(matches!(
            outcomes[2],
            Outcome::Updated {
                kind: CommandType::Write,
                ..
            }
        ));
    }

    #[test]
    fn test_late_read_response_does_not_settle_next_read() {
        let (mut driver, _events) = keyed_driver();
        driver.client_mut().set_silent(true);
        let thermostat = Thermostat::new();
        driver.push(Command::read(thermostat.battery().clone()));
        driver.push(Command::read(thermostat.battery().clone()));
        driver.dispatch();
        let timed_out = driver.in_flight_op().unwrap();
        assert!(driver.poll_timeout(driver.deadline().unwrap()));
        let current = driver.in_flight_op().unwrap();

        driver.handle_event(GattEvent::ReadResponse {
            op: timed_out,
            characteristic: uuids::BATTERY_LEVEL,
            value: vec![50],
        });
        assert_eq!(driver.in_flight_op(), Some(current));
        assert_eq!(thermostat.battery().value(), None);
        assert_eq!(driver.take_outcomes().len(), 1);

        driver.handle_event(GattEvent::ReadResponse {
            op: current,
            characteristic: uuids::BATTERY_LEVEL,
            value: vec![60],
        });
        assert!(driver.is_idle());
        assert_eq!(thermostat.battery().value(), Some(60));
    }

    #[test]
    fn test_notification_completes_only_reads() {
        let (mut driver, mut events) = keyed_driver();
        let thermostat = Thermostat::new();
        driver.push(Command::read(thermostat.temperature().clone()));
        driver.dispatch();
        driver.handle_event(events.try_recv().unwrap());

        driver.client_mut().set_silent(true);
        driver.push(thermostat.set_target_temperature(23.0).unwrap());
        driver.dispatch();
        let raw = driver.client().raw_value(&uuids::TEMPERATURE).unwrap();
        driver.handle_event(GattEvent::Notification {
            characteristic: uuids::TEMPERATURE,
            value: raw.clone(),
        });
        assert_eq!(driver.in_flight().map(Command::kind), Some(CommandType::Write));

        assert!(driver.poll_timeout(driver.deadline().unwrap()));
        driver.push(Command::read(thermostat.temperature().clone()));
        driver.dispatch();
        driver.handle_event(GattEvent::Notification {
            characteristic: uuids::TEMPERATURE,
            value: raw,
        });
        assert!(driver.is_idle());
        assert_eq!(thermostat.temperature().state(), PropertyState::Valid);
    }

    #[test]
    fn test_rejected_issue_does_not_block_queue() {
        let (mut driver, mut events) = keyed_driver();
        driver.client_mut().reject_characteristic(uuids::BATTERY_LEVEL);
        let thermostat = Thermostat::new();
        driver.push(Command::read(thermostat.battery().clone()));
        driver.push(Command::read(thermostat.errors().clone()));

        assert!(driver.dispatch());
        assert!(matches!(
            &driver.take_outcomes()[..],
            [Outcome::Rejected {
                property: "battery_level",
                error: Error::Io(_),
                ..
            }]
        ));
        assert_eq!(thermostat.battery().state(), PropertyState::Unknown);
        assert!(driver.session().has_key());

        driver.handle_event(events.try_recv().unwrap());
        assert!(driver.is_idle());
        assert_eq!(thermostat.errors().value().map(|e| e.bits()), Some(0));
        assert_eq!(driver.client().issued().len(), 1);
    }

    #[test]
    fn test_missing_key_rejects_without_traffic() {
        let mut client = MockClient::thermostat(&key()).unwrap();
        let _events = client.subscribe();
        let mut driver = Driver::new(client, DriverConfig::default());
        let thermostat = Thermostat::new();
        driver.push(Command::read(thermostat.temperature().clone()));

        assert!(!driver.dispatch());
        assert!(driver.client().issued().is_empty());
        let outcomes = driver.take_outcomes();
        assert!(matches!(
            &outcomes[..],
            [Outcome::Rejected {
                error: Error::MissingKey,
                ..
            }]
        ));
    }

    #[test]
    fn test_nack_restores_previous_value() {
        let (mut driver, mut events) = keyed_driver();
        let thermostat = Thermostat::new();
        driver.push(Command::read(thermostat.temperature().clone()));
        driver.dispatch();
        driver.handle_event(events.try_recv().unwrap());

        driver.client_mut().set_nack_writes(true);
        driver.push(thermostat.set_target_temperature(24.0).unwrap());
        driver.dispatch();
        driver.handle_event(events.try_recv().unwrap());

        let temperature = thermostat.temperature();
        assert_eq!(temperature.write_state(), WriteState::Failed);
        assert_eq!(temperature.state(), PropertyState::Valid);
        assert_eq!(temperature.value().map(|t| t.target.celsius()), Some(21.5));
        assert!(matches!(
            driver.take_outcomes().last(),
            Some(Outcome::Failed {
                error: Error::WriteFailed { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_poll_timeout() {
        let (mut driver, _events) = keyed_driver();
        driver.client_mut().set_silent(true);
        let thermostat = Thermostat::new();
        driver.push(Command::read(thermostat.battery().clone()));
        driver.dispatch();

        let deadline = driver.deadline().unwrap();
        assert!(!driver.poll_timeout(deadline - Duration::from_millis(1)));
        assert!(driver.poll_timeout(deadline));
        assert!(driver.is_idle());
        assert_eq!(thermostat.battery().state(), PropertyState::Unknown);
        assert!(matches!(
            &driver.take_outcomes()[..],
            [Outcome::Failed {
                error: Error::Timeout { .. },
                ..
            }]
        ));
    }

    #[test]
    fn test_connection_lost_drains_queue_and_clears_key() {
        let (mut driver, mut events) = keyed_driver();
        let thermostat = Thermostat::new();
        for command in thermostat.poll_commands() {
            driver.push(command);
        }
        driver.dispatch();
        let _ = events.try_recv();

        driver.client_mut().set_connected(false);
        driver.handle_event(events.try_recv().unwrap());

        assert!(driver.is_idle());
        assert!(!driver.session().has_key());
        let outcomes = driver.take_outcomes();
        assert_eq!(outcomes.len(), thermostat.poll_commands().len());
        assert!(
            outcomes
                .iter()
                .all(|o| matches!(o.error(), Some(Error::ConnectionLost)))
        );
    }

    #[test]
    fn test_not_connected_on_dispatch_is_connection_loss() {
        let client = MockClient::thermostat(&key()).unwrap().disconnected();
        let mut driver = Driver::new(client, DriverConfig::default());
        driver.install_key(key());
        let thermostat = Thermostat::new();
        driver.push(Command::read(thermostat.battery().clone()));
        driver.push(Command::read(thermostat.errors().clone()));

        assert!(!driver.dispatch());
        assert!(driver.queue().is_empty());
        assert!(!driver.session().has_key());
        let outcomes = driver.take_outcomes();
        assert!(matches!(outcomes[0], Outcome::Rejected { .. }));
        assert!(matches!(outcomes[1], Outcome::Failed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_idle_times_out_silent_device() {
        let (mut driver, mut events) = keyed_driver();
        driver.client_mut().set_silent(true);
        let thermostat = Thermostat::new();
        driver.push(Command::read(thermostat.battery().clone()));
        driver.push(Command::read(thermostat.errors().clone()));

        let outcomes = driver.run_until_idle(&mut events).await;
        assert_eq!(outcomes.len(), 2);
        assert!(
            outcomes
                .iter()
                .all(|o| matches!(o.error(), Some(Error::Timeout { .. })))
        );
        assert_eq!(driver.client().issued().len(), 2);
    }

    #[tokio::test]
    async fn test_run_until_idle_refreshes_everything() {
        let (mut driver, mut events) = keyed_driver();
        let thermostat = Thermostat::new();
        for command in thermostat.poll_commands() {
            driver.push(command);
        }
        let outcomes = driver.run_until_idle(&mut events).await;
        assert!(outcomes.iter().all(Outcome::is_success), "{outcomes:?}");
        assert_eq!(thermostat.name().value().as_deref(), Some("Living room"));
        assert_eq!(thermostat.errors().value().map(|e| e.bits()), Some(0));
    }
}

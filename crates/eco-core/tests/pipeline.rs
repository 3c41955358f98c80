//! End-to-end tests of the command pipeline against the mock peripheral.
//!
//! Every test goes through the public API only: property handles from a
//! [`Thermostat`], commands, the [`Driver`] and a [`MockClient`].

use std::sync::Arc;
use std::time::Duration;

use eco_core::properties::{BatteryLevel, ErrorsProperty, NameProperty};
use eco_core::{
    Command, CommandQueue, CommandType, Driver, DriverConfig, Error, ErrorKind, EventReceiver,
    IssuedOp, MockClient, Outcome, Property, PropertyRef, PropertyState, ScheduleMode, SecretKey,
    Session, Thermostat, WritableProperty, WriteState, uuids,
};

fn key() -> SecretKey {
    "000102030405060708090a0b0c0d0e0f".parse().unwrap()
}

fn driver_for(mut client: MockClient) -> (Driver<MockClient>, EventReceiver) {
    let events = client.subscribe();
    (Driver::new(client, DriverConfig::default()), events)
}

#[tokio::test]
async fn battery_notification_updates_value() {
    let client = MockClient::new().with_value(uuids::BATTERY_LEVEL, vec![0]);
    let (mut driver, mut events) = driver_for(client);
    let thermostat = Thermostat::new();

    // Issue the read but let the answer come in as a notification.
    driver.client_mut().set_silent(true);
    driver.push(Command::read(thermostat.battery().clone()));
    assert!(driver.dispatch());
    assert_eq!(thermostat.battery().state(), PropertyState::AwaitingResponse);

    driver.client_mut().set_silent(false);
    driver.client_mut().notify(uuids::BATTERY_LEVEL, vec![0x64]);
    driver.handle_event(events.recv().await.unwrap());

    assert_eq!(thermostat.battery().value(), Some(100));
    assert_eq!(thermostat.battery().state(), PropertyState::Valid);
    assert!(driver.is_idle());
}

#[tokio::test]
async fn battery_read_response_updates_value() {
    let client = MockClient::new().with_value(uuids::BATTERY_LEVEL, vec![0x64]);
    let (mut driver, mut events) = driver_for(client);
    let thermostat = Thermostat::new();

    driver.push(Command::read(thermostat.battery().clone()));
    let outcomes = driver.run_until_idle(&mut events).await;

    assert!(matches!(
        &outcomes[..],
        [Outcome::Updated {
            property: "battery_level",
            kind: CommandType::Read,
        }]
    ));
    assert_eq!(thermostat.battery().value(), Some(100));
}

#[test]
fn write_without_key_is_refused_before_traffic() {
    let mut client = MockClient::thermostat(&key()).unwrap();
    let thermostat = Thermostat::new();
    let command = thermostat.set_target_temperature(21.5).unwrap();

    let err = command.execute(&mut client, &Session::new()).unwrap_err();
    assert!(matches!(err, Error::MissingKey));
    assert_eq!(err.kind(), ErrorKind::Authentication);

    let temperature = thermostat.temperature();
    assert!(client.issued().is_empty());
    assert_eq!(temperature.value(), None);
    assert_eq!(temperature.state(), PropertyState::Unknown);
    assert_eq!(temperature.write_state(), WriteState::None);
    // Staged value survives so the write can be retried once a key is installed.
    assert!(temperature.staged().is_some());
}

#[tokio::test]
async fn write_without_key_is_reported_as_rejected() {
    let (mut driver, mut events) = driver_for(MockClient::thermostat(&key()).unwrap());
    let thermostat = Thermostat::new();

    driver.push(thermostat.set_target_temperature(21.5).unwrap());
    let outcomes = driver.run_until_idle(&mut events).await;

    assert!(matches!(
        &outcomes[..],
        [Outcome::Rejected {
            kind: CommandType::Write,
            error: Error::MissingKey,
            ..
        }]
    ));
    assert!(driver.client().issued().is_empty());
    assert_eq!(thermostat.temperature().value(), None);
}

#[tokio::test]
async fn acknowledged_write_becomes_confirmed_value() {
    let client = MockClient::thermostat(&key())
        .unwrap()
        .with_encrypted_value(uuids::TEMPERATURE, &key(), &[40, 38, 0, 0, 0, 0, 0, 0])
        .unwrap();
    let (mut driver, mut events) = driver_for(client);
    driver.install_key(key());
    let thermostat = Thermostat::new();

    driver.push(Command::read(thermostat.temperature().clone()));
    driver.run_until_idle(&mut events).await;
    assert_eq!(
        thermostat.temperature().value().map(|t| t.target.celsius()),
        Some(20.0)
    );

    driver.push(thermostat.set_target_temperature(21.5).unwrap());
    let outcomes = driver.run_until_idle(&mut events).await;
    assert!(outcomes.iter().all(Outcome::is_success), "{outcomes:?}");

    let temperature = thermostat.temperature();
    let confirmed = temperature.value().unwrap();
    assert_eq!(confirmed.target.celsius(), 21.5);
    assert_eq!(confirmed.room.celsius(), 19.0);
    assert_eq!(temperature.staged(), None);
    assert_eq!(temperature.write_state(), WriteState::Confirmed);
    assert_eq!(temperature.state(), PropertyState::Valid);

    let stored = driver
        .client()
        .decrypted_value(&uuids::TEMPERATURE, &key())
        .unwrap();
    assert_eq!(&stored[..2], &[43, 38]);
}

#[test]
fn queue_pops_in_push_order() {
    let a = Arc::new(BatteryLevel::new());
    let b = Arc::new(ErrorsProperty::new());
    let c = Arc::new(NameProperty::new());

    let mut queue = CommandQueue::new();
    queue.push(Command::read(a));
    queue.push(Command::read(b));
    queue.push(Command::read(c));

    for expected in ["battery_level", "errors", "device_name"] {
        assert!(!queue.is_empty());
        assert_eq!(queue.pop().unwrap().property().name(), expected);
    }
    assert!(queue.is_empty());
}

#[test]
fn write_over_read_only_property_is_a_capability_error() {
    let battery = PropertyRef::ReadOnly(Arc::new(BatteryLevel::new()));
    let err = Command::new(CommandType::Write, battery).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Capability);
}

#[tokio::test]
async fn malformed_payload_keeps_last_value() {
    let (mut driver, mut events) = driver_for(MockClient::thermostat(&key()).unwrap());
    let thermostat = Thermostat::new();

    driver.push(Command::read(thermostat.battery().clone()));
    driver.run_until_idle(&mut events).await;
    assert_eq!(thermostat.battery().value(), Some(85));

    *driver.client_mut() = MockClient::thermostat(&key())
        .unwrap()
        .with_value(uuids::BATTERY_LEVEL, vec![200]);
    let mut events = driver.client_mut().subscribe();
    driver.push(Command::read(thermostat.battery().clone()));
    let outcomes = driver.run_until_idle(&mut events).await;

    assert!(matches!(
        outcomes[0].error().map(Error::kind),
        Some(ErrorKind::MalformedResponse)
    ));
    assert_eq!(thermostat.battery().value(), Some(85));
    assert_eq!(thermostat.battery().state(), PropertyState::Stale);
    assert_eq!(thermostat.snapshot().stale(), vec!["battery_level"]);
}

#[tokio::test]
async fn full_refresh_decrypts_every_property() {
    let (mut driver, mut events) = driver_for(MockClient::thermostat(&key()).unwrap());
    driver.install_key(key());
    let thermostat = Thermostat::new();

    for command in thermostat.poll_commands() {
        driver.push(command);
    }
    let outcomes = driver.run_until_idle(&mut events).await;
    assert_eq!(outcomes.len(), 8);
    assert!(outcomes.iter().all(Outcome::is_success), "{outcomes:?}");

    let snapshot = thermostat.snapshot();
    assert_eq!(snapshot.battery_level.value, Some(85));
    assert_eq!(snapshot.name.value.as_deref(), Some("Living room"));
    assert_eq!(snapshot.errors.value, Some(vec![]));
    let settings = snapshot.settings.value.unwrap();
    assert!(settings.adaptive_learning());
    assert_eq!(settings.temperature_max.celsius(), 28.0);
    assert_eq!(snapshot.firmware_revision.value.as_deref(), Some("01.08"));
    assert_eq!(snapshot.hardware_revision.value.as_deref(), Some("2.0"));

    let issued: Vec<_> = driver.client().issued().to_vec();
    assert_eq!(issued[0], IssuedOp::Read(uuids::BATTERY_LEVEL));
    assert_eq!(issued.len(), 8);
}

#[tokio::test]
async fn settings_write_round_trips_through_device() {
    let (mut driver, mut events) = driver_for(MockClient::thermostat(&key()).unwrap());
    driver.install_key(key());
    let thermostat = Thermostat::new();

    driver.push(Command::read(thermostat.settings().clone()));
    driver.run_until_idle(&mut events).await;

    driver.push(thermostat.set_child_safety(true).unwrap());
    driver.push(Command::read(thermostat.settings().clone()));
    let outcomes = driver.run_until_idle(&mut events).await;
    assert!(outcomes.iter().all(Outcome::is_success), "{outcomes:?}");

    let settings = thermostat.settings().value().unwrap();
    assert!(settings.child_safety());
    assert!(settings.adaptive_learning());
}

#[tokio::test]
async fn schedule_mode_write_reaches_device() {
    let (mut driver, mut events) = driver_for(MockClient::thermostat(&key()).unwrap());
    driver.install_key(key());
    let thermostat = Thermostat::new();

    driver.push(Command::read(thermostat.settings().clone()));
    driver.run_until_idle(&mut events).await;
    driver.push(thermostat.set_schedule_mode(ScheduleMode::Scheduled).unwrap());
    let outcomes = driver.run_until_idle(&mut events).await;
    assert!(outcomes.iter().all(Outcome::is_success), "{outcomes:?}");

    let stored = driver
        .client()
        .decrypted_value(&uuids::SETTINGS, &key())
        .unwrap();
    assert_eq!(stored[4], ScheduleMode::Scheduled as u8);
    assert_eq!(stored[0], 0x80);
}

#[tokio::test(start_paused = true)]
async fn silent_device_times_out_and_queue_moves_on() {
    let config = DriverConfig::new().response_timeout(Duration::from_secs(2));
    let mut client = MockClient::thermostat(&key()).unwrap();
    client.set_silent(true);
    let mut events = client.subscribe();
    let mut driver = Driver::new(client, config);
    let thermostat = Thermostat::new();

    driver.push(Command::read(thermostat.battery().clone()));
    driver.push(Command::read(thermostat.errors().clone()));
    let outcomes = driver.run_until_idle(&mut events).await;

    assert_eq!(outcomes.len(), 2);
    assert!(matches!(
        outcomes[0].error(),
        Some(Error::Timeout { duration, .. }) if *duration == Duration::from_secs(2)
    ));
    // The second read was refused for lack of a key, without traffic.
    assert!(matches!(outcomes[1].error(), Some(Error::MissingKey)));
    assert_eq!(driver.client().issued().len(), 1);
}

#[tokio::test]
async fn disconnect_fails_pending_work_and_forgets_key() {
    let (mut driver, mut events) = driver_for(MockClient::thermostat(&key()).unwrap());
    driver.install_key(key());
    let thermostat = Thermostat::new();

    driver.client_mut().set_silent(true);
    for command in thermostat.poll_commands() {
        driver.push(command);
    }
    driver.dispatch();
    driver.client_mut().set_silent(false);
    driver.client_mut().set_connected(false);

    let outcomes = driver.run_until_idle(&mut events).await;
    assert_eq!(outcomes.len(), 8);
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o.error(), Some(Error::ConnectionLost)))
    );
    assert!(!driver.session().has_key());
    assert_eq!(thermostat.battery().state(), PropertyState::Unknown);
}

//! Hardware integration tests for eco-core
//!
//! These tests require a real Danfoss Eco valve and should be run with:
//! ```
//! cargo test --package eco-core --test hardware_tests -- --ignored --nocapture
//! ```
//!
//! Configure the valve via environment variables:
//! - `ECO_DEVICE`: name or address of the valve
//! - `ECO_SECRET_KEY`: its secret key (32 hex characters), for encrypted reads
//! - `ECO_PIN`: its PIN, if one is set
//!
//! Example:
//! ```
//! ECO_DEVICE="eTRV" ECO_SECRET_KEY=00112233445566778899aabbccddeeff \
//!     cargo test --package eco-core --test hardware_tests -- --ignored --nocapture
//! ```

use std::env;
use std::time::Duration;

use eco_core::{ConnectionConfig, EcoDevice, Outcome, SecretKey};
use tokio::time::timeout;

/// Default timeout for a whole test.
const BLE_TIMEOUT: Duration = Duration::from_secs(60);

fn get_device() -> Option<String> {
    env::var("ECO_DEVICE").ok().filter(|s| !s.is_empty())
}

fn get_key() -> Option<SecretKey> {
    env::var("ECO_SECRET_KEY").ok()?.parse().ok()
}

fn config() -> ConnectionConfig {
    let mut config = ConnectionConfig::default();
    if let Some(key) = get_key() {
        config = config.secret_key(key);
    }
    if let Some(pin) = env::var("ECO_PIN").ok().and_then(|p| p.parse().ok()) {
        config = config.pin(pin);
    }
    config
}

async fn connect(identifier: &str) -> EcoDevice {
    match timeout(BLE_TIMEOUT, EcoDevice::connect_with_config(identifier, config())).await {
        Ok(Ok(device)) => device,
        Ok(Err(e)) => panic!("Failed to connect: {e}"),
        Err(_) => panic!("Connection timed out"),
    }
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_connect_and_read_battery() {
    let Some(identifier) = get_device() else {
        println!("Skipping: ECO_DEVICE not set");
        return;
    };

    let mut device = connect(&identifier).await;
    println!("Connected to {:?} ({})", device.name(), device.address());

    let battery = device.thermostat().battery().clone();
    device.submit(eco_core::Command::read(battery.clone()));
    let outcomes = device.flush().await;
    assert!(outcomes.iter().all(Outcome::is_success), "{outcomes:?}");
    println!("Battery: {:?}%", battery.value());

    device.disconnect().await.expect("disconnect");
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_refresh_with_key() {
    let Some(identifier) = get_device() else {
        println!("Skipping: ECO_DEVICE not set");
        return;
    };
    if get_key().is_none() {
        println!("Skipping: ECO_SECRET_KEY not set");
        return;
    }

    let mut device = connect(&identifier).await;
    let outcomes = device.refresh().await;
    for outcome in &outcomes {
        println!("{} {}: {:?}", outcome.kind(), outcome.property(), outcome.error());
    }
    assert!(outcomes.iter().all(Outcome::is_success));

    let snapshot = device.thermostat().snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot).unwrap());
    assert!(snapshot.temperature.value.is_some());

    device.disconnect().await.expect("disconnect");
}

#[tokio::test]
#[ignore = "requires BLE hardware in pairing mode"]
async fn test_read_secret_key() {
    let Some(identifier) = get_device() else {
        println!("Skipping: ECO_DEVICE not set");
        return;
    };

    let mut device = connect(&identifier).await;
    match device.read_secret_key().await {
        Ok(key) => println!("Secret key read ({} hex chars)", key.to_hex().len()),
        Err(e) => println!("Valve not in pairing mode? {e}"),
    }
    device.disconnect().await.expect("disconnect");
}

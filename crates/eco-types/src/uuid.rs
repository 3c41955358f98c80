//! Bluetooth UUIDs for Danfoss Eco devices.
//!
//! This module contains all the UUIDs needed to talk to a Danfoss Eco
//! radiator thermostat over Bluetooth Low Energy.

use uuid::{Uuid, uuid};

// --- Danfoss Service UUIDs ---

/// Danfoss Eco custom service carrying every proprietary characteristic.
pub const ECO_SERVICE: Uuid = uuid!("10020000-2749-0001-0000-00802f9b34fb");

/// Prefix shared by advertised names of Danfoss Eco valves.
pub const DEVICE_NAME_PREFIX: &str = "eTRV";

// --- Danfoss Characteristic UUIDs ---

/// PIN code characteristic, written once after connecting (plaintext).
pub const PIN_CODE: Uuid = uuid!("10020001-2749-0001-0000-00802f9b34fb");

/// Device settings: limits, schedule mode, flags (encrypted).
pub const SETTINGS: Uuid = uuid!("10020003-2749-0001-0000-00802f9b34fb");

/// Target and room temperature (encrypted).
pub const TEMPERATURE: Uuid = uuid!("10020005-2749-0001-0000-00802f9b34fb");

/// User-assigned device name (encrypted).
pub const DEVICE_NAME: Uuid = uuid!("10020006-2749-0001-0000-00802f9b34fb");

/// Device clock (encrypted).
pub const CURRENT_TIME: Uuid = uuid!("10020008-2749-0001-0000-00802f9b34fb");

/// Active error codes (encrypted).
pub const ERRORS: Uuid = uuid!("1002000a-2749-0001-0000-00802f9b34fb");

/// Session secret key, readable only while the valve is in pairing mode (plaintext).
pub const SECRET_KEY: Uuid = uuid!("1002000b-2749-0001-0000-00802f9b34fb");

// --- Standard BLE Service UUIDs ---

/// Battery service.
pub const BATTERY_SERVICE: Uuid = uuid!("0000180f-0000-1000-8000-00805f9b34fb");

/// Device Information service.
pub const DEVICE_INFO_SERVICE: Uuid = uuid!("0000180a-0000-1000-8000-00805f9b34fb");

// --- Standard Characteristic UUIDs ---

/// Battery level characteristic (plaintext percentage).
pub const BATTERY_LEVEL: Uuid = uuid!("00002a19-0000-1000-8000-00805f9b34fb");

/// Firmware revision string characteristic.
pub const FIRMWARE_REVISION: Uuid = uuid!("00002a26-0000-1000-8000-00805f9b34fb");

/// Hardware revision string characteristic.
pub const HARDWARE_REVISION: Uuid = uuid!("00002a27-0000-1000-8000-00805f9b34fb");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proprietary_characteristics_share_service_base() {
        let service = ECO_SERVICE.as_u128();
        for characteristic in [
            PIN_CODE,
            SETTINGS,
            TEMPERATURE,
            DEVICE_NAME,
            CURRENT_TIME,
            ERRORS,
            SECRET_KEY,
        ] {
            // Only the 16-bit slot after the 1002 prefix differs.
            let diff = characteristic.as_u128() ^ service;
            assert_eq!(diff & !(0xFFFF_u128 << 96), 0, "{characteristic}");
        }
    }

    #[test]
    fn test_battery_level_uuid() {
        assert_eq!(
            BATTERY_LEVEL.to_string(),
            "00002a19-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_secret_key_uuid() {
        assert_eq!(
            SECRET_KEY.to_string(),
            "1002000b-2749-0001-0000-00802f9b34fb"
        );
    }

    #[test]
    fn test_characteristics_are_unique() {
        let all = [
            PIN_CODE,
            SETTINGS,
            TEMPERATURE,
            DEVICE_NAME,
            CURRENT_TIME,
            ERRORS,
            SECRET_KEY,
            BATTERY_LEVEL,
            FIRMWARE_REVISION,
            HARDWARE_REVISION,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}

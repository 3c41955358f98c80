//! Identifier helpers shared by device lookup and connection.

use btleplug::platform::PeripheralId;

/// Address reported by platforms that hide the real MAC (macOS).
pub const HIDDEN_ADDRESS: &str = "00:00:00:00:00:00";

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms they wrap the MAC
/// address. The `PeripheralId(...)` wrapper is stripped either way.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    strip_id_wrapper(&format!("{:?}", id)).to_string()
}

fn strip_id_wrapper(debug: &str) -> &str {
    debug
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
}

/// Create an identifier string from an address and peripheral ID.
///
/// Uses the Bluetooth address unless the platform hides it.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    if address == HIDDEN_ADDRESS {
        format_peripheral_id(peripheral_id)
    } else {
        address.to_string()
    }
}

/// The MAC address in `address`, unless the platform hides it.
pub fn mac_address(address: &str) -> Option<String> {
    (address != HIDDEN_ADDRESS).then(|| address.to_uppercase())
}

/// Lowercase a MAC address and drop its separators, for comparison.
pub fn normalize_address(address: &str) -> String {
    address
        .chars()
        .filter(|c| !matches!(c, ':' | '-'))
        .collect::<String>()
        .to_lowercase()
}

/// Whether `address` and `identifier` name the same MAC address.
pub fn address_matches(address: &str, identifier: &str) -> bool {
    address != HIDDEN_ADDRESS && normalize_address(address) == normalize_address(identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_id_wrapper() {
        assert_eq!(
            strip_id_wrapper("PeripheralId(AA:BB:CC:DD:EE:FF)"),
            "AA:BB:CC:DD:EE:FF"
        );
        assert_eq!(strip_id_wrapper("plain"), "plain");
    }

    #[test]
    fn test_address_matching() {
        assert!(address_matches("00:04:2F:AA:BB:CC", "00042faabbcc"));
        assert!(address_matches("00:04:2F:AA:BB:CC", "00-04-2f-aa-bb-cc"));
        assert!(!address_matches("00:04:2F:AA:BB:CC", "00:04:2F:AA:BB:CD"));
        assert!(!address_matches(HIDDEN_ADDRESS, HIDDEN_ADDRESS));
    }

    #[test]
    fn test_mac_address_hides_placeholder() {
        assert_eq!(
            mac_address("00:04:2f:aa:bb:cc").as_deref(),
            Some("00:04:2F:AA:BB:CC")
        );
        assert_eq!(mac_address(HIDDEN_ADDRESS), None);
    }
}

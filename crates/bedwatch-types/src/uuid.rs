//! Bluetooth UUIDs and handles for the bed-occupancy sensor.
//!
//! The sensor exposes a single boolean channel through the standard
//! Automation IO "Digital" characteristic. The interactive-tool backend
//! addresses the same value by its GATT handle instead of its UUID.

use uuid::{Uuid, uuid};

// --- Standard BLE Service UUIDs ---

/// Automation IO service.
pub const AUTOMATION_IO_SERVICE: Uuid = uuid!("00001815-0000-1000-8000-00805f9b34fb");

/// Generic Access Profile (GAP) service.
pub const GAP_SERVICE: Uuid = uuid!("00001800-0000-1000-8000-00805f9b34fb");

// --- Characteristic UUIDs ---

/// Digital characteristic carrying the occupancy switch state.
pub const DIGITAL: Uuid = uuid!("00002a56-0000-1000-8000-00805f9b34fb");

/// Device name characteristic.
pub const DEVICE_NAME: Uuid = uuid!("00002a00-0000-1000-8000-00805f9b34fb");

// --- GATT handles (interactive-tool backend) ---

/// Attribute handle of the occupancy switch characteristic value.
pub const SWITCH_HANDLE: u16 = 0x0024;

/// Raw byte the sensor firmware reports for the "occupied" state.
///
/// Any other value is treated as unoccupied; firmware revisions disagree on
/// what they report for "off".
pub const DEFAULT_ON_CODE: u8 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digital_is_standard_16bit_expansion() {
        let s = DIGITAL.to_string();
        assert!(s.starts_with("00002a56"));
        assert!(s.ends_with("00805f9b34fb"));
    }

    #[test]
    fn test_switch_handle_value() {
        assert_eq!(SWITCH_HANDLE, 0x24);
    }
}

//! Test utilities for usb-print-bridge
//!
//! Provides descriptor builders and helper functions for testing across crates.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{create_mock_descriptor, create_printer_interface};
//!
//! let device = create_mock_descriptor(1, 0x04b8, 0x0202);
//! assert_eq!(device.system_name, "/dev/bus/usb/001/001");
//!
//! let interface = create_printer_interface(0);
//! assert!(interface.first_bulk_out().is_some());
//! ```

use crate::usb_types::{DeviceDescriptor, Direction, EndpointInfo, InterfaceInfo, TransferKind};
use std::future::Future;
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a mock DeviceDescriptor for testing
///
/// # Arguments
/// * `address` - Device address on bus 1, used for the system name
/// * `vendor_id` - USB Vendor ID
/// * `product_id` - USB Product ID
pub fn create_mock_descriptor(address: u8, vendor_id: u16, product_id: u16) -> DeviceDescriptor {
    DeviceDescriptor::new(
        vendor_id,
        product_id,
        format!("/dev/bus/usb/001/{:03}", address),
    )
    .with_manufacturer(format!("Test Manufacturer {}", address))
}

/// Create a list of mock devices with distinct ids
pub fn create_mock_device_list(count: u8) -> Vec<DeviceDescriptor> {
    (1..=count)
        .map(|i| create_mock_descriptor(i, 0x1000 + u16::from(i), 0x2000 + u16::from(i)))
        .collect()
}

/// Create an endpoint descriptor
pub fn create_endpoint(address: u8, kind: TransferKind) -> EndpointInfo {
    EndpointInfo {
        address,
        kind,
        direction: if address & 0x80 != 0 {
            Direction::In
        } else {
            Direction::Out
        },
        max_packet_size: 512,
    }
}

/// Create a printer-class interface: bulk OUT 0x01 and bulk IN 0x82
pub fn create_printer_interface(number: u8) -> InterfaceInfo {
    InterfaceInfo {
        number,
        alternate_setting: 0,
        class_code: 0x07,
        endpoints: vec![
            create_endpoint(0x01 + number, TransferKind::Bulk),
            create_endpoint(0x82 + number, TransferKind::Bulk),
        ],
    }
}

/// Create a HID interface with only an interrupt IN endpoint
pub fn create_hid_interface(number: u8) -> InterfaceInfo {
    InterfaceInfo {
        number,
        alternate_setting: 0,
        class_code: 0x03,
        endpoints: vec![create_endpoint(0x81 + number, TransferKind::Interrupt)],
    }
}

/// Create a payload of the given size with a recognizable pattern
pub fn create_mock_payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i & 0xFF) as u8).collect()
}

/// Timeout wrapper for async tests
///
/// # Example
/// ```ignore
/// use common::test_utils::{with_timeout, DEFAULT_TEST_TIMEOUT};
///
/// #[tokio::test]
/// async fn test_with_timeout() {
///     let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await.unwrap();
///     assert_eq!(result, 42);
/// }
/// ```
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_mock_device_list() {
        let devices = create_mock_device_list(10);
        assert_eq!(devices.len(), 10);

        let keys: std::collections::HashSet<_> = devices.iter().map(|d| d.identity()).collect();
        assert_eq!(keys.len(), 10);
    }

    #[test]
    fn test_create_printer_interface() {
        let interface = create_printer_interface(0);
        assert_eq!(interface.class_code, 0x07);

        let out = interface.first_bulk_out().unwrap();
        assert_eq!(out.address, 0x01);
        assert_eq!(out.direction, Direction::Out);
        assert_eq!(interface.endpoints[1].direction, Direction::In);
    }

    #[test]
    fn test_create_hid_interface_has_no_bulk_out() {
        assert!(create_hid_interface(0).first_bulk_out().is_none());
    }

    #[test]
    fn test_create_mock_payload() {
        let data = create_mock_payload(1024);
        assert_eq!(data.len(), 1024);
        assert_eq!(data[255], 255);
        assert_eq!(data[256], 0);
    }

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_failure() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            42
        })
        .await;

        assert!(result.is_err());
    }
}

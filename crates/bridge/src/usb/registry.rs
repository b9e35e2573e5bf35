//! Device registry
//!
//! Enumerates attached devices and matches them by `(vendor_id, product_id)`.
//! Nothing is cached: every call takes a fresh snapshot from the host.

use crate::usb::host::UsbHost;
use common::DeviceDescriptor;
use tracing::{debug, warn};

/// List attached devices with their manufacturer names
///
/// The host is enumerated once up front; manufacturer strings are read lazily
/// as the iterator advances. A device whose manufacturer cannot be read is
/// still listed, with no manufacturer.
pub fn list_devices<H: UsbHost>(host: &H) -> impl Iterator<Item = DeviceDescriptor> {
    snapshot(host)
        .into_iter()
        .map(move |device| with_manufacturer(host, device))
}

/// First attached device with this identity key
pub fn find_device<H: UsbHost>(
    host: &H,
    vendor_id: u16,
    product_id: u16,
) -> Option<DeviceDescriptor> {
    snapshot(host)
        .into_iter()
        .find(|device| device.matches(vendor_id, product_id))
        .map(|device| with_manufacturer(host, device))
}

fn snapshot<H: UsbHost>(host: &H) -> Vec<DeviceDescriptor> {
    match host.enumerate() {
        Ok(devices) => {
            debug!("Enumerated {} devices", devices.len());
            devices
        }
        Err(e) => {
            warn!("Device enumeration failed: {}", e);
            Vec::new()
        }
    }
}

fn with_manufacturer<H: UsbHost>(host: &H, mut device: DeviceDescriptor) -> DeviceDescriptor {
    device.manufacturer_name = match host.manufacturer_name(&device) {
        Ok(name) => name,
        Err(e) => {
            debug!("Could not read manufacturer of {}: {}", device, e);
            None
        }
    };
    device
}

//! Host abstraction
//!
//! The USB stack the bridge runs on is reached only through these traits:
//! [`UsbHost`] enumerates devices and opens them, [`UsbConnection`] is an
//! opened device, and [`PermissionPrompt`] asks the user (or the platform)
//! for access. The production implementation lives in [`crate::usb::device`],
//! an in-memory one in [`crate::usb::mock`].

use common::{DeviceDescriptor, EndpointInfo, HostEventSender, InterfaceInfo, PermissionToken};
use std::time::Duration;
use thiserror::Error;

/// Failure of a host primitive
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("device not found")]
    NotFound,

    #[error("access denied")]
    Access,

    #[error("resource busy")]
    Busy,

    #[error("operation timed out")]
    Timeout,

    #[error("endpoint stalled")]
    Pipe,

    #[error("device disconnected")]
    NoDevice,

    #[error("operation not supported")]
    NotSupported,

    #[error("input/output error")]
    Io,

    #[error("{0}")]
    Other(String),
}

/// Device enumeration and open primitives
pub trait UsbHost {
    /// Opened device handle type
    type Connection: UsbConnection;

    /// Snapshot of attached devices, in host order
    ///
    /// Descriptors come back without a manufacturer name; see
    /// [`UsbHost::manufacturer_name`].
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, HostError>;

    /// Read the manufacturer string of one device
    fn manufacturer_name(&self, device: &DeviceDescriptor) -> Result<Option<String>, HostError>;

    /// Interfaces of the active configuration, in descriptor order
    fn interfaces(&self, device: &DeviceDescriptor) -> Result<Vec<InterfaceInfo>, HostError>;

    /// Whether this process may open the device
    fn has_permission(&self, device: &DeviceDescriptor) -> bool;

    /// Open the device
    fn open(&self, device: &DeviceDescriptor) -> Result<Self::Connection, HostError>;

    /// Start publishing `DeviceDetached`/`DeviceAttached` events
    ///
    /// Returns [`HostError::NotSupported`] when the platform cannot report
    /// removals.
    fn subscribe(&mut self, events: HostEventSender) -> Result<(), HostError>;

    /// Pump pending host callbacks for at most `timeout`
    fn handle_events(&self, timeout: Duration) -> Result<(), HostError> {
        std::thread::sleep(timeout);
        Ok(())
    }
}

/// An opened device
pub trait UsbConnection {
    /// Claim an interface exclusively, taking it from any kernel driver
    fn claim_interface(&mut self, interface: &InterfaceInfo) -> Result<(), HostError>;

    /// Release a claimed interface
    fn release_interface(&mut self, interface: &InterfaceInfo) -> Result<(), HostError>;

    /// Write one buffer to a bulk OUT endpoint, returning bytes transmitted
    fn bulk_write(
        &mut self,
        endpoint: &EndpointInfo,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, HostError>;

    /// Close the handle
    fn close(self) -> Result<(), HostError>
    where
        Self: Sized;
}

/// Source of one-shot permission answers
///
/// An implementation must eventually publish exactly one
/// `HostEvent::PermissionResult` carrying `token`, or fail here.
pub trait PermissionPrompt {
    fn prompt(&self, device: &DeviceDescriptor, token: PermissionToken) -> Result<(), HostError>;
}

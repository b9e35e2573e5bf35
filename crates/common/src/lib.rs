//! Common utilities for usb-print-bridge
//!
//! This crate provides functionality shared between the bridge library and
//! its front ends: USB descriptor types, error handling, logging setup, and
//! the async channel bridge for USB thread communication.

pub mod channel;
pub mod error;
pub mod logging;
pub mod test_utils;
pub mod usb_types;

pub use channel::{
    HostEvent, HostEventSender, Reply, UsbBridge, UsbCommand, UsbWorker, create_usb_bridge,
};
pub use error::{Error, Result};
pub use logging::setup_logging;
pub use usb_types::{
    DeviceDescriptor, Direction, EndpointInfo, InterfaceInfo, PermissionToken, TransferKind,
};

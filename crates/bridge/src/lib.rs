//! USB print bridge
//!
//! Exposes an attached USB printer to a host application as a small set of
//! methods (`listDevices`, `requestPermission`, `connect`, `printBytes`,
//! `disconnect`, `isConnected`). Requests are executed one at a time on a
//! dedicated USB thread and answered over the JSON-lines protocol from the
//! `protocol` crate.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod serve;
pub mod usb;

pub use config::BridgeConfig;
pub use dispatch::Dispatcher;
pub use error::{BridgeError, Result};

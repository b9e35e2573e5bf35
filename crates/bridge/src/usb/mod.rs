//! USB subsystem
//!
//! Everything that touches the USB stack lives here: the host abstraction
//! and its libusb and in-memory implementations, device listing, permission
//! negotiation, the single printer session, chunked bulk writes and removal
//! tracking.
//!
//! All of it runs on one dedicated thread (see [`worker`]) so the Tokio
//! runtime never blocks on libusb and session operations never overlap.

pub mod device;
pub mod host;
pub mod manager;
pub mod mock;
pub mod permission;
pub mod registry;
pub mod transfers;
pub mod watcher;
pub mod worker;

pub use device::{ProbePrompt, RusbConnection, RusbHost};
pub use host::{HostError, PermissionPrompt, UsbConnection, UsbHost};
pub use manager::{ConnectionManager, ConnectionSession};
pub use permission::{PermissionNegotiator, PermissionOutcome};
pub use transfers::{CHUNK_TIMEOUT, MAX_CHUNK_SIZE};
pub use watcher::DetachmentWatcher;
pub use worker::{UsbWorkerThread, spawn_usb_worker, spawn_worker_with};

//! Async channel bridge between Tokio runtime and USB thread
//!
//! Requests flow from the runtime to the USB worker over a bounded command
//! channel. Host notifications (permission results, hot-plug) flow into the
//! worker over an unbounded event channel, because they are published from
//! libusb callbacks that run on the worker thread itself and must never block.

use crate::usb_types::{DeviceDescriptor, PermissionToken};
use async_channel::{Receiver, Sender, bounded, unbounded};
use protocol::{ErrorCode, Request, Response};
use tracing::{debug, warn};

/// Commands from Tokio runtime to USB thread
#[derive(Debug)]
pub enum UsbCommand {
    /// Execute one request
    Call {
        request: Request,
        /// Channel to send the reply back
        response: tokio::sync::oneshot::Sender<Reply>,
    },

    /// Disconnect any session and stop the USB thread
    Shutdown,
}

/// Worker reply to a [`UsbCommand::Call`]
#[derive(Debug)]
pub enum Reply {
    /// The request completed on the worker
    Ready(Response),
    /// A permission prompt is outstanding; the grant arrives later
    Pending(tokio::sync::oneshot::Receiver<bool>),
}

/// Notifications from the host into the USB thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// Answer to a permission prompt
    PermissionResult {
        token: PermissionToken,
        granted: bool,
    },

    /// Device hot-plugged
    DeviceAttached { device: DeviceDescriptor },

    /// Device removed from the bus
    DeviceDetached { device: DeviceDescriptor },
}

/// Publisher side of the host event channel
#[derive(Debug, Clone)]
pub struct HostEventSender {
    tx: Sender<HostEvent>,
}

impl HostEventSender {
    /// Queue an event without blocking
    pub fn publish(&self, event: HostEvent) {
        debug!("Publishing host event: {:?}", event);
        if let Err(e) = self.tx.try_send(event) {
            warn!("Dropping host event, USB worker gone: {}", e);
        }
    }
}

/// Handle for Tokio runtime (async)
#[derive(Clone)]
pub struct UsbBridge {
    cmd_tx: Sender<UsbCommand>,
}

impl UsbBridge {
    /// Send a command to the USB thread
    pub async fn send_command(&self, cmd: UsbCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Run a request on the USB thread and wait for its final response
    ///
    /// Channel failures are reported as `unavailable`, so callers always get
    /// a well-formed response.
    pub async fn call(&self, request: Request) -> Response {
        let method = request.method();
        let (tx, rx) = tokio::sync::oneshot::channel();

        if let Err(e) = self
            .send_command(UsbCommand::Call {
                request,
                response: tx,
            })
            .await
        {
            return Response::error(ErrorCode::Unavailable, e.to_string());
        }

        match rx.await {
            Ok(Reply::Ready(response)) => response,
            Ok(Reply::Pending(grant)) => match grant.await {
                Ok(granted) => Response::ok_bool(granted),
                Err(_) => Response::error(
                    ErrorCode::Unavailable,
                    "permission request abandoned by USB worker",
                ),
            },
            Err(_) => Response::error(
                ErrorCode::Unavailable,
                format!("USB worker dropped {} request", method),
            ),
        }
    }
}

/// Handle for USB thread (blocking)
pub struct UsbWorker {
    cmd_rx: Receiver<UsbCommand>,
    event_rx: Receiver<HostEvent>,
    event_tx: Sender<HostEvent>,
}

impl UsbWorker {
    /// Receive a command from Tokio runtime (blocking)
    pub fn recv_command(&self) -> crate::Result<UsbCommand> {
        self.cmd_rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Try to receive a command without blocking
    pub fn try_recv_command(&self) -> Option<UsbCommand> {
        self.cmd_rx.try_recv().ok()
    }

    /// All bridge handles are gone and no command is queued
    pub fn is_closed(&self) -> bool {
        self.cmd_rx.is_closed() && self.cmd_rx.is_empty()
    }

    /// Try to receive a host event without blocking
    pub fn try_recv_event(&self) -> Option<HostEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Publisher for host backends and permission prompts
    pub fn event_sender(&self) -> HostEventSender {
        HostEventSender {
            tx: self.event_tx.clone(),
        }
    }
}

/// Create the channel bridge between Tokio and USB thread
///
/// Returns (UsbBridge for Tokio, UsbWorker for USB thread)
pub fn create_usb_bridge() -> (UsbBridge, UsbWorker) {
    let (cmd_tx, cmd_rx) = bounded(256);
    let (event_tx, event_rx) = unbounded();

    (
        UsbBridge { cmd_tx },
        UsbWorker {
            cmd_rx,
            event_rx,
            event_tx,
        },
    )
}

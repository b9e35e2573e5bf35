//! Connection manager
//!
//! Owns the single live session: an opened device, the interface claimed on
//! it, the bulk OUT endpoint selected on that interface, and the descriptor of
//! the device. The four are stored as one value, so the manager is either
//! idle or holds a complete session.

use crate::error::{BridgeError, Result};
use crate::usb::host::{UsbConnection, UsbHost};
use crate::usb::registry;
use common::{DeviceDescriptor, EndpointInfo, InterfaceInfo};
use tracing::{debug, info, warn};

/// An open, claimed device ready for bulk writes
pub struct ConnectionSession<C> {
    connection: C,
    interface: InterfaceInfo,
    endpoint: EndpointInfo,
    device: DeviceDescriptor,
}

impl<C: UsbConnection> ConnectionSession<C> {
    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    pub fn interface(&self) -> &InterfaceInfo {
        &self.interface
    }

    pub fn endpoint(&self) -> &EndpointInfo {
        &self.endpoint
    }

    /// Connection and output endpoint, borrowed together for a transfer
    pub fn writer(&mut self) -> (&mut C, &EndpointInfo) {
        (&mut self.connection, &self.endpoint)
    }

    /// Release the interface and close the handle, logging failures
    fn teardown(self) {
        let ConnectionSession {
            mut connection,
            interface,
            device,
            ..
        } = self;

        if let Err(e) = connection.release_interface(&interface) {
            warn!(
                "Failed to release interface {} on {}: {}",
                interface.number, device, e
            );
        }

        if let Err(e) = connection.close() {
            warn!("Failed to close {}: {}", device, e);
        }

        info!("Disconnected from {}", device);
    }
}

/// Holds at most one [`ConnectionSession`]
pub struct ConnectionManager<C> {
    session: Option<ConnectionSession<C>>,
}

impl<C: UsbConnection> Default for ConnectionManager<C> {
    fn default() -> Self {
        Self { session: None }
    }
}

impl<C: UsbConnection> ConnectionManager<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the device with this identity key and claim its printer interface
    ///
    /// Interfaces are scanned in descriptor order; the first one carrying a
    /// bulk OUT endpoint is tried. When its claim fails the handle is closed
    /// and the scan moves on to the next candidate. Permission must already
    /// be held. Any existing session is torn down first.
    pub fn connect<H>(&mut self, host: &H, vendor_id: u16, product_id: u16) -> Result<()>
    where
        H: UsbHost<Connection = C>,
    {
        let device = registry::find_device(host, vendor_id, product_id).ok_or(
            BridgeError::NotFound {
                vendor_id,
                product_id,
            },
        )?;

        if !host.has_permission(&device) {
            return Err(BridgeError::PermissionDenied {
                device: device.to_string(),
            });
        }

        if self.session.is_some() {
            debug!("Replacing existing session before connecting to {}", device);
            self.disconnect();
        }

        let interfaces = host
            .interfaces(&device)
            .map_err(|e| connect_failed(&device, format!("cannot read interfaces: {}", e)))?;

        for interface in interfaces {
            let Some(endpoint) = interface.first_bulk_out().copied() else {
                debug!(
                    "Interface {} on {} has no bulk OUT endpoint",
                    interface.number, device
                );
                continue;
            };

            let mut connection = host
                .open(&device)
                .map_err(|e| connect_failed(&device, format!("open failed: {}", e)))?;

            if let Err(e) = connection.claim_interface(&interface) {
                warn!(
                    "Failed to claim interface {} on {}: {}",
                    interface.number, device, e
                );
                if let Err(e) = connection.close() {
                    debug!("Failed to close {} after claim failure: {}", device, e);
                }
                continue;
            }

            info!(
                "Connected to {} on interface {} endpoint {:#04x}",
                device, interface.number, endpoint.address
            );
            self.session = Some(ConnectionSession {
                connection,
                interface,
                endpoint,
                device,
            });
            return Ok(());
        }

        Err(connect_failed(&device, "no claimable interface with a bulk OUT endpoint"))
    }

    /// Tear down the session, if any
    ///
    /// Release and close failures are logged and otherwise ignored; the
    /// manager is idle afterwards in every case.
    pub fn disconnect(&mut self) -> bool {
        match self.session.take() {
            Some(session) => session.teardown(),
            None => debug!("Disconnect while idle"),
        }
        true
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Descriptor of the connected device
    pub fn bound_device(&self) -> Option<&DeviceDescriptor> {
        self.session.as_ref().map(|session| &session.device)
    }

    pub fn session(&self) -> Option<&ConnectionSession<C>> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut ConnectionSession<C>> {
        self.session.as_mut()
    }
}

fn connect_failed(device: &DeviceDescriptor, reason: impl Into<String>) -> BridgeError {
    BridgeError::ConnectFailed {
        device: device.to_string(),
        reason: reason.into(),
    }
}

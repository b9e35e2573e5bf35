//! Permission negotiation
//!
//! Each prompt is correlated to a single-use [`PermissionToken`]. The waiting
//! requester is represented by a oneshot sender stored under that token; the
//! entry is removed before the answer is sent, so a request resolves exactly
//! once and a duplicate answer for the same token finds nothing.

use crate::error::{BridgeError, Result};
use crate::usb::host::{PermissionPrompt, UsbHost};
use crate::usb::registry;
use common::{DeviceDescriptor, PermissionToken};
use std::collections::HashMap;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Result of starting a permission request
#[derive(Debug)]
pub enum PermissionOutcome {
    /// Answered without a prompt
    Resolved(bool),
    /// A prompt is outstanding; the answer arrives on this receiver
    Pending(oneshot::Receiver<bool>),
}

struct PendingPermission {
    device: DeviceDescriptor,
    responder: oneshot::Sender<bool>,
}

/// Tracks outstanding permission prompts
#[derive(Default)]
pub struct PermissionNegotiator {
    pending: HashMap<PermissionToken, PendingPermission>,
}

impl PermissionNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request access to the device with this identity key
    ///
    /// A device that is already accessible resolves to `true` without a
    /// prompt. Otherwise a prompt is issued; an older outstanding request for
    /// the same device is retired with `false`.
    pub fn request<H: UsbHost, P: PermissionPrompt>(
        &mut self,
        host: &H,
        prompt: &P,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<PermissionOutcome> {
        let device = registry::find_device(host, vendor_id, product_id).ok_or(
            BridgeError::NotFound {
                vendor_id,
                product_id,
            },
        )?;

        if host.has_permission(&device) {
            debug!("Permission already held for {}", device);
            return Ok(PermissionOutcome::Resolved(true));
        }

        self.supersede(&device);

        let token = self.fresh_token();
        let (responder, receiver) = oneshot::channel();
        self.pending.insert(
            token,
            PendingPermission {
                device: device.clone(),
                responder,
            },
        );

        if let Err(e) = prompt.prompt(&device, token) {
            warn!("Failed to prompt for permission on {}: {}", device, e);
            self.pending.remove(&token);
            return Ok(PermissionOutcome::Resolved(false));
        }

        info!("Requested permission for {} (token {})", device, token);
        Ok(PermissionOutcome::Pending(receiver))
    }

    /// Deliver the answer for `token`
    ///
    /// Returns `false` if no request is waiting on this token.
    pub fn resolve(&mut self, token: PermissionToken, granted: bool) -> bool {
        let Some(request) = self.pending.remove(&token) else {
            debug!("Ignoring permission result for unknown token {}", token);
            return false;
        };

        info!(
            "Permission {} for {}",
            if granted { "granted" } else { "denied" },
            request.device
        );

        if request.responder.send(granted).is_err() {
            debug!("Permission requester for token {} went away", token);
        }
        true
    }

    /// Number of requests still waiting for an answer
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop every outstanding request without answering it
    pub fn cancel_all(&mut self) {
        if !self.pending.is_empty() {
            debug!("Abandoning {} permission requests", self.pending.len());
        }
        self.pending.clear();
    }

    fn supersede(&mut self, device: &DeviceDescriptor) {
        let stale: Vec<PermissionToken> = self
            .pending
            .iter()
            .filter(|(_, request)| request.device.is_same_device(device))
            .map(|(token, _)| *token)
            .collect();

        for token in stale {
            debug!("Superseding permission request {} for {}", token, device);
            self.resolve(token, false);
        }
    }

    fn fresh_token(&self) -> PermissionToken {
        loop {
            let token = PermissionToken::random();
            if !self.pending.contains_key(&token) {
                return token;
            }
        }
    }
}

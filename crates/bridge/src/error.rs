//! Session error types

use thiserror::Error;

/// Errors from the session operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// No attached device has this identity key
    #[error("device {vendor_id:04x}:{product_id:04x} not found")]
    NotFound { vendor_id: u16, product_id: u16 },

    /// The device was found but this process may not open it
    #[error("permission not granted for {device}")]
    PermissionDenied { device: String },

    /// Open failed, or no interface could be claimed
    #[error("failed to connect to {device}: {reason}")]
    ConnectFailed { device: String, reason: String },

    /// No session is open
    #[error("not connected")]
    NotConnected,

    /// A chunk made no progress
    #[error("bulk write failed at offset {offset} of {total}: {reason}")]
    WriteFailed {
        offset: usize,
        total: usize,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::HostError;

    #[test]
    fn test_error_display() {
        let err = BridgeError::NotFound {
            vendor_id: 0x04b8,
            product_id: 0x0202,
        };
        assert_eq!(err.to_string(), "device 04b8:0202 not found");

        let err = BridgeError::WriteFailed {
            offset: 4096,
            total: 10000,
            reason: HostError::Timeout.to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("4096"));
        assert!(msg.contains("timed out"));
    }
}

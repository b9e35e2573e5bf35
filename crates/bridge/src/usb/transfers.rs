//! Bulk transfer execution
//!
//! Payloads are written to the session's bulk OUT endpoint in chunks of at
//! most [`MAX_CHUNK_SIZE`] bytes. The offset advances by what the device
//! actually accepted, so a short write is followed by a chunk starting where
//! it stopped. A chunk that transmits nothing fails the whole payload.

use crate::error::{BridgeError, Result};
use crate::usb::host::UsbConnection;
use crate::usb::manager::ConnectionManager;
use common::EndpointInfo;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Largest chunk handed to a single bulk transfer
pub const MAX_CHUNK_SIZE: usize = 4096;

/// Timeout for each chunk
pub const CHUNK_TIMEOUT: Duration = Duration::from_millis(3000);

/// Write a payload over the current session
///
/// Returns the number of bytes written, which is always the payload length.
pub fn print_bytes<C: UsbConnection>(
    manager: &mut ConnectionManager<C>,
    payload: &[u8],
) -> Result<usize> {
    let session = manager.session_mut().ok_or(BridgeError::NotConnected)?;
    let device = session.device().to_string();
    let (connection, endpoint) = session.writer();

    let written = write_chunked(connection, endpoint, payload)?;
    info!("Wrote {} bytes to {}", written, device);
    Ok(written)
}

/// Write `payload` to `endpoint` chunk by chunk
pub fn write_chunked<C: UsbConnection>(
    connection: &mut C,
    endpoint: &EndpointInfo,
    payload: &[u8],
) -> Result<usize> {
    let total = payload.len();
    let mut offset = 0;

    while offset < total {
        let end = (offset + MAX_CHUNK_SIZE).min(total);
        let chunk = &payload[offset..end];

        let sent = match connection.bulk_write(endpoint, chunk, CHUNK_TIMEOUT) {
            Ok(0) => {
                warn!(
                    "Bulk write on endpoint {:#04x} made no progress at offset {}",
                    endpoint.address, offset
                );
                return Err(BridgeError::WriteFailed {
                    offset,
                    total,
                    reason: "no bytes transmitted".to_string(),
                });
            }
            Ok(sent) => sent,
            Err(e) => {
                warn!(
                    "Bulk write on endpoint {:#04x} failed at offset {}: {}",
                    endpoint.address, offset, e
                );
                return Err(BridgeError::WriteFailed {
                    offset,
                    total,
                    reason: e.to_string(),
                });
            }
        };

        // never step past the chunk that was handed out
        offset += sent.min(chunk.len());
        debug!(
            "Bulk chunk: endpoint={:#04x}, requested={}, sent={}, offset={}/{}",
            endpoint.address,
            chunk.len(),
            sent,
            offset,
            total
        );
    }

    Ok(offset)
}

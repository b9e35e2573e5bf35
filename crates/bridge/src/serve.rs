//! JSON-lines method channel
//!
//! Reads one call per line, runs it through the USB worker and writes one
//! response per line, in request order. Lines that do not parse are answered
//! with `bad_args`; the channel keeps going until the reader hits EOF.
//!
//! Lines are buffered up to [`MAX_LINE_SIZE`]. A longer line is answered with
//! `bad_args` and closes the channel.

use anyhow::{Context, Result};
use common::UsbBridge;
use futures::StreamExt;
use protocol::{MAX_LINE_SIZE, MethodError, Request, Response, decode_call, encode_response};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, info, trace, warn};

/// Serve calls from `reader` until EOF
///
/// Returns the number of calls answered.
pub async fn serve<R, W>(bridge: &UsbBridge, reader: R, writer: W) -> Result<usize>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    serve_with_limit(bridge, reader, writer, MAX_LINE_SIZE).await
}

/// Serve calls with lines capped at `max_line` bytes
pub async fn serve_with_limit<R, W>(
    bridge: &UsbBridge,
    reader: R,
    mut writer: W,
    max_line: usize,
) -> Result<usize>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(max_line));
    let mut answered = 0;

    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                warn!("Request line exceeds {} bytes, closing channel", max_line);
                let response = Response::Error(MethodError::bad_args(format!(
                    "Line too long (max: {} bytes)",
                    max_line
                )));
                write_response(&mut writer, &response).await?;
                answered += 1;
                break;
            }
            Err(LinesCodecError::Io(e)) => return Err(e).context("Failed to read request"),
        };

        if line.trim().is_empty() {
            continue;
        }
        trace!("Received: {}", line);

        let response = handle_line(bridge, &line).await;
        write_response(&mut writer, &response).await?;
        answered += 1;
    }

    info!("Request stream closed after {} calls", answered);
    Ok(answered)
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &Response) -> Result<()> {
    let encoded = encode_response(response).context("Failed to encode response")?;

    writer
        .write_all(encoded.as_bytes())
        .await
        .context("Failed to write response")?;
    writer.write_all(b"\n").await.context("Failed to write response")?;
    writer.flush().await.context("Failed to flush response")?;
    Ok(())
}

/// Answer one request line
pub async fn handle_line(bridge: &UsbBridge, line: &str) -> Response {
    let request = match decode_call(line)
        .map_err(|e| MethodError::bad_args(e.to_string()))
        .and_then(Request::try_from)
    {
        Ok(request) => request,
        Err(e) => {
            debug!("Rejected request: {}", e);
            return Response::Error(e);
        }
    };

    bridge.call(request).await
}

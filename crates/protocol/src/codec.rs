//! JSON-lines encoding
//!
//! One method call or response per line:
//! ```text
//! {"method":"connect","args":{"vendorId":1208,"productId":514}}
//! {"ok":true}
//! ```
//!
//! Lines longer than [`MAX_LINE_SIZE`] are rejected before parsing. Readers
//! should bound their line buffer to the same limit.

use crate::error::{ProtocolError, Result};
use crate::{MethodCall, Response};

/// Maximum accepted line length (32 MiB)
pub const MAX_LINE_SIZE: usize = 32 * 1024 * 1024;

/// Decode a method call from one line
///
/// # Example
/// ```
/// use protocol::decode_call;
///
/// let call = decode_call(r#"{"method":"isConnected"}"#).unwrap();
/// assert_eq!(call.method, "isConnected");
/// assert!(call.args.is_null());
/// ```
pub fn decode_call(line: &str) -> Result<MethodCall> {
    check_size(line)?;
    Ok(serde_json::from_str(line.trim())?)
}

/// Encode a method call as one line, without the trailing newline
pub fn encode_call(call: &MethodCall) -> Result<String> {
    single_line(serde_json::to_string(call)?)
}

/// Encode a response as one line, without the trailing newline
///
/// # Example
/// ```
/// use protocol::{Response, encode_response};
///
/// let line = encode_response(&Response::ok_bool(true)).unwrap();
/// assert_eq!(line, r#"{"ok":true}"#);
/// ```
pub fn encode_response(response: &Response) -> Result<String> {
    single_line(serde_json::to_string(response)?)
}

/// Decode a response from one line
pub fn decode_response(line: &str) -> Result<Response> {
    check_size(line)?;
    Ok(serde_json::from_str(line.trim())?)
}

fn check_size(line: &str) -> Result<()> {
    if line.len() > MAX_LINE_SIZE {
        return Err(ProtocolError::LineTooLong {
            size: line.len(),
            max: MAX_LINE_SIZE,
        });
    }
    Ok(())
}

fn single_line(encoded: String) -> Result<String> {
    // serde_json's compact writer escapes newlines inside strings
    if encoded.contains('\n') {
        return Err(ProtocolError::EmbeddedNewline);
    }
    Ok(encoded)
}

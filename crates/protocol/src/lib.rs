//! Protocol library for usb-print-bridge
//!
//! This crate defines the request/response surface of the bridge: the
//! operations a front end may call, their arguments, their results and the
//! error codes they fail with. Messages travel as JSON, one per line.
//!
//! # Example
//!
//! ```
//! use protocol::{Request, DeviceArgs, decode_call, encode_call};
//!
//! let request = Request::Connect(DeviceArgs::new(0x04b8, 0x0202));
//! let line = encode_call(&request.to_call().unwrap()).unwrap();
//!
//! let decoded = Request::try_from(decode_call(&line).unwrap()).unwrap();
//! assert_eq!(decoded, request);
//! ```

pub mod codec;
pub mod error;
pub mod messages;
pub mod types;

pub use codec::{MAX_LINE_SIZE, decode_call, decode_response, encode_call, encode_response};
pub use error::{ProtocolError, Result};
pub use messages::{DeviceArgs, MethodCall, PrintArgs, Request, Response, ResponseValue};
pub use types::{DeviceSummary, ErrorCode, MethodError};

//! Wire-level value types
//!
//! Device summaries returned by `listDevices` and the error codes every
//! operation can fail with.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Device entry returned by `listDevices`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Host system name of the device node
    pub device_name: String,
    /// Manufacturer string, absent when it could not be read
    pub manufacturer_name: Option<String>,
}

/// Error codes reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed or missing request fields
    BadArgs,
    /// No attached device matches the identity key
    NotFound,
    /// Open or interface claim failed, or permission missing
    ConnectFailed,
    /// A chunk made no progress, or no session exists
    WriteFailed,
    /// Method name is not known
    NotImplemented,
    /// The USB worker is not running
    Unavailable,
}

impl ErrorCode {
    /// Wire name of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadArgs => "bad_args",
            ErrorCode::NotFound => "not_found",
            ErrorCode::ConnectFailed => "connect_failed",
            ErrorCode::WriteFailed => "write_failed",
            ErrorCode::NotImplemented => "not_implemented",
            ErrorCode::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned in place of a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodError {
    pub code: ErrorCode,
    pub message: String,
}

impl MethodError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn bad_args(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadArgs, message)
    }
}

impl fmt::Display for MethodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for MethodError {}

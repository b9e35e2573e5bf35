//! Method calls and their results
//!
//! A call arrives as a loosely typed [`MethodCall`] (method name plus JSON
//! arguments) and is narrowed into a typed [`Request`]. Argument checking that
//! depends only on the request shape happens here so every front end reports
//! `bad_args` the same way.

use crate::types::{DeviceSummary, ErrorCode, MethodError};
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

/// Untyped method call as read off the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    /// Method name, e.g. `printBytes`
    pub method: String,
    /// Method arguments (null when the method takes none)
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Arguments identifying a device by vendor and product id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceArgs {
    #[serde(default)]
    pub vendor_id: Option<i64>,
    #[serde(default)]
    pub product_id: Option<i64>,
}

impl DeviceArgs {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id: Some(i64::from(vendor_id)),
            product_id: Some(i64::from(product_id)),
        }
    }

    /// Check that both ids are present and fit a USB id
    pub fn identity(&self) -> Result<(u16, u16), MethodError> {
        let (Some(vendor_id), Some(product_id)) = (self.vendor_id, self.product_id) else {
            return Err(MethodError::bad_args("vendorId/productId required"));
        };

        let vendor_id = u16::try_from(vendor_id)
            .map_err(|_| MethodError::bad_args(format!("vendorId {} out of range", vendor_id)))?;
        let product_id = u16::try_from(product_id).map_err(|_| {
            MethodError::bad_args(format!("productId {} out of range", product_id))
        })?;

        Ok((vendor_id, product_id))
    }
}

/// Arguments for `printBytes`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintArgs {
    #[serde(default)]
    pub bytes: Option<ByteBuf>,
}

impl PrintArgs {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Some(ByteBuf::from(bytes)),
        }
    }

    /// Take the payload, failing when it is missing
    pub fn into_payload(self) -> Result<Vec<u8>, MethodError> {
        self.bytes
            .map(ByteBuf::into_vec)
            .ok_or_else(|| MethodError::bad_args("bytes required"))
    }
}

/// Typed request
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    IsConnected,
    ListDevices,
    RequestPermission(DeviceArgs),
    Connect(DeviceArgs),
    PrintBytes(PrintArgs),
    Disconnect,
}

impl Request {
    /// Wire method name
    pub fn method(&self) -> &'static str {
        match self {
            Request::IsConnected => "isConnected",
            Request::ListDevices => "listDevices",
            Request::RequestPermission(_) => "requestPermission",
            Request::Connect(_) => "connect",
            Request::PrintBytes(_) => "printBytes",
            Request::Disconnect => "disconnect",
        }
    }

    /// Convert back to an untyped call for sending
    pub fn to_call(&self) -> Result<MethodCall, serde_json::Error> {
        let args = match self {
            Request::RequestPermission(args) | Request::Connect(args) => {
                serde_json::to_value(args)?
            }
            Request::PrintBytes(args) => serde_json::to_value(args)?,
            _ => serde_json::Value::Null,
        };

        Ok(MethodCall {
            method: self.method().to_string(),
            args,
        })
    }
}

impl TryFrom<MethodCall> for Request {
    type Error = MethodError;

    fn try_from(call: MethodCall) -> Result<Self, Self::Error> {
        match call.method.as_str() {
            "isConnected" => Ok(Request::IsConnected),
            "listDevices" => Ok(Request::ListDevices),
            "requestPermission" => Ok(Request::RequestPermission(parse_args(call.args)?)),
            "connect" => Ok(Request::Connect(parse_args(call.args)?)),
            "printBytes" => Ok(Request::PrintBytes(parse_args(call.args)?)),
            "disconnect" => Ok(Request::Disconnect),
            other => Err(MethodError::new(
                ErrorCode::NotImplemented,
                format!("unknown method '{}'", other),
            )),
        }
    }
}

fn parse_args<T: Default + for<'de> Deserialize<'de>>(
    args: serde_json::Value,
) -> Result<T, MethodError> {
    if args.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(args).map_err(|e| MethodError::bad_args(e.to_string()))
}

/// Successful result payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseValue {
    Bool(bool),
    Devices(Vec<DeviceSummary>),
}

/// Result of one method call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Response {
    Ok(ResponseValue),
    Error(MethodError),
}

impl Response {
    pub fn ok_bool(value: bool) -> Self {
        Response::Ok(ResponseValue::Bool(value))
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Response::Error(MethodError::new(code, message))
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok(_))
    }

    /// Error code, if this is an error
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Response::Error(e) => Some(e.code),
            Response::Ok(_) => None,
        }
    }
}

impl From<Result<ResponseValue, MethodError>> for Response {
    fn from(result: Result<ResponseValue, MethodError>) -> Self {
        match result {
            Ok(value) => Response::Ok(value),
            Err(e) => Response::Error(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(method: &str, args: serde_json::Value) -> MethodCall {
        MethodCall {
            method: method.to_string(),
            args,
        }
    }

    #[test]
    fn test_device_args_missing_field() {
        let request = Request::try_from(call("connect", json!({ "vendorId": 1234 }))).unwrap();
        let Request::Connect(args) = request else {
            panic!("expected connect");
        };
        let err = args.identity().unwrap_err();
        assert_eq!(err.code, ErrorCode::BadArgs);
    }

    #[test]
    fn test_device_args_out_of_range() {
        let args = DeviceArgs {
            vendor_id: Some(70000),
            product_id: Some(1),
        };
        assert_eq!(args.identity().unwrap_err().code, ErrorCode::BadArgs);

        let args = DeviceArgs {
            vendor_id: Some(1),
            product_id: Some(-1),
        };
        assert_eq!(args.identity().unwrap_err().code, ErrorCode::BadArgs);
    }

    #[test]
    fn test_device_args_wrong_type() {
        let err = Request::try_from(call("requestPermission", json!({ "vendorId": "x" })))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::BadArgs);
    }

    #[test]
    fn test_unknown_method() {
        let err = Request::try_from(call("selfDestruct", serde_json::Value::Null)).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotImplemented);
    }

    #[test]
    fn test_print_bytes_from_json_array() {
        let request = Request::try_from(call("printBytes", json!({ "bytes": [27, 64, 10] }))).unwrap();
        let Request::PrintBytes(args) = request else {
            panic!("expected printBytes");
        };
        assert_eq!(args.into_payload().unwrap(), vec![27, 64, 10]);
    }

    #[test]
    fn test_print_bytes_missing() {
        let request = Request::try_from(call("printBytes", serde_json::Value::Null)).unwrap();
        let Request::PrintBytes(args) = request else {
            panic!("expected printBytes");
        };
        assert_eq!(args.into_payload().unwrap_err().code, ErrorCode::BadArgs);
    }

    #[test]
    fn test_to_call_preserves_request() {
        let request = Request::Connect(DeviceArgs::new(0x04b8, 0x0202));
        let call = request.to_call().unwrap();
        assert_eq!(call.method, "connect");
        assert_eq!(Request::try_from(call).unwrap(), request);
    }

    #[test]
    fn test_response_shape() {
        let ok = serde_json::to_value(Response::ok_bool(true)).unwrap();
        assert_eq!(ok, json!({ "ok": true }));

        let err = serde_json::to_value(Response::error(ErrorCode::WriteFailed, "chunk failed"))
            .unwrap();
        assert_eq!(
            err,
            json!({ "error": { "code": "write_failed", "message": "chunk failed" } })
        );
    }
}

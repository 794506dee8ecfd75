//! JSON-RPC 2.0 types and parsing.
//!
//! # JSON-RPC 2.0 Compliance
//!
//! - Requests have `id`, `method`, and optional `params`
//! - Notifications are requests without `id`
//! - Batches are non-empty arrays of requests/notifications
//! - `id` type (string or integer) MUST be preserved in responses
//!
//! # Security Note
//!
//! This module parses untrusted input. Size limits are enforced at the
//! HTTP layer (see `relay::server`).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::borrow::Cow;

use crate::error::RpcError;
use crate::error::jsonrpc::JsonRpcError;

/// JSON-RPC 2.0 version constant.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 request ID.
///
/// JSON-RPC 2.0 allows string or integer IDs. We preserve the exact type
/// to ensure responses use the same type as requests.
///
/// # Important
///
/// Never coerce between types! If the client sends `"id": 1`, respond with
/// `"id": 1`, not `"id": "1"`.
///
/// # Note on Null IDs
///
/// `"id": null` is valid (though unusual) and is echoed back in responses.
/// This is distinct from a missing `id` field, which marks a notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JsonRpcId {
    /// Integer ID (e.g., `"id": 1`)
    Number(i64),
    /// String ID (e.g., `"id": "abc-123"`)
    String(String),
    /// Explicit null ID (e.g., `"id": null`)
    Null,
    /// A numeric id outside `i64` (a float, or an integer above `i64::MAX`).
    ///
    /// Never accepted on a valid request; only echoed back when reporting an
    /// invalid one.
    Unrepresentable(serde_json::Number),
}

impl JsonRpcId {
    /// Best-effort extraction of an id from an arbitrary JSON value.
    ///
    /// Used when reporting an invalid request: string and numeric ids are
    /// copied, anything else reports as `Null`.
    pub fn salvage(value: &Value) -> Self {
        match value.get("id") {
            Some(Value::String(s)) => JsonRpcId::String(s.clone()),
            Some(Value::Number(n)) => n
                .as_i64()
                .map_or_else(|| JsonRpcId::Unrepresentable(n.clone()), JsonRpcId::Number),
            _ => JsonRpcId::Null,
        }
    }
}

impl From<i64> for JsonRpcId {
    fn from(n: i64) -> Self {
        JsonRpcId::Number(n)
    }
}

impl From<&str> for JsonRpcId {
    fn from(s: &str) -> Self {
        JsonRpcId::String(s.to_string())
    }
}

impl Serialize for JsonRpcId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            JsonRpcId::Number(n) => serializer.serialize_i64(*n),
            JsonRpcId::String(s) => serializer.serialize_str(s),
            JsonRpcId::Null => serializer.serialize_none(),
            JsonRpcId::Unrepresentable(n) => n.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for JsonRpcId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(JsonRpcId::Number(i))
                } else {
                    Err(serde::de::Error::custom(
                        "JSON-RPC ID must be integer, not float",
                    ))
                }
            }
            Value::String(s) => Ok(JsonRpcId::String(s)),
            Value::Null => Ok(JsonRpcId::Null),
            _ => Err(serde::de::Error::custom(
                "JSON-RPC ID must be string, integer, or null",
            )),
        }
    }
}

/// Wrapper to distinguish between missing field and explicit null.
/// - `Absent` - field was not present in JSON
/// - `Null` - field was present with value `null`
/// - `Present(T)` - field was present with a non-null value
#[derive(Debug, Clone, Default)]
enum MaybeNull<T> {
    #[default]
    Absent,
    Null,
    Present(T),
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for MaybeNull<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            Ok(MaybeNull::Null)
        } else {
            T::deserialize(value)
                .map(MaybeNull::Present)
                .map_err(serde::de::Error::custom)
        }
    }
}

/// Deserializer that converts MaybeNull<JsonRpcId> to Option<JsonRpcId>
/// where explicit null becomes Some(JsonRpcId::Null)
fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<JsonRpcId>, D::Error>
where
    D: Deserializer<'de>,
{
    match MaybeNull::deserialize(deserializer)? {
        MaybeNull::Absent => Ok(None),
        MaybeNull::Null => Ok(Some(JsonRpcId::Null)),
        MaybeNull::Present(id) => Ok(Some(id)),
    }
}

/// Raw JSON-RPC 2.0 request as received from the client.
///
/// All fields are optional to allow for proper error reporting on malformed
/// requests.
#[derive(Debug, Clone, Deserialize)]
struct RawJsonRpcRequest {
    jsonrpc: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    id: Option<JsonRpcId>,
    method: Option<String>,
    params: Option<Value>,
}

/// Validated JSON-RPC 2.0 request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always "2.0"
    pub jsonrpc: Cow<'static, str>,
    /// Request ID (None for notifications)
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_id"
    )]
    pub id: Option<JsonRpcId>,
    /// Method name
    pub method: String,
    /// Method parameters (array or object)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Build a request that expects a response.
    pub fn call(id: JsonRpcId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    /// Build a notification.
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            id: None,
            method: method.into(),
            params,
        }
    }

    /// Returns true if this is a notification (no ID).
    #[inline]
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC 2.0 response.
///
/// # ID Serialization
///
/// The `id` field is REQUIRED in responses and MUST be:
/// - The same as the request's `id` for success/error responses
/// - `null` if the request `id` could not be determined (e.g., parse error)
///
/// The `id` field always serializes: `None` becomes `"id": null` in JSON.
/// This differs from `JsonRpcRequest` where `None` means "notification" and
/// the field is omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always "2.0"
    pub jsonrpc: Cow<'static, str>,
    /// Request ID - always serialized (None becomes null)
    pub id: Option<JsonRpcId>,
    /// Result (mutually exclusive with error)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error (mutually exclusive with result)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a success response.
    ///
    /// # Arguments
    ///
    /// * `id` - The request ID to echo back
    /// * `result` - The result value
    pub fn success(id: Option<JsonRpcId>, result: Value) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    ///
    /// # Arguments
    ///
    /// * `id` - The request ID to echo back. Pass `None` if the request ID
    ///   could not be determined (e.g., parse error) - this serializes as
    ///   `"id": null`.
    /// * `error` - The JSON-RPC error object
    pub fn error(id: Option<JsonRpcId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// What the engine emits for one input: a single response or a batch.
///
/// Serializes as the bare response object or array.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RpcOutput {
    Single(JsonRpcResponse),
    Batch(Vec<JsonRpcResponse>),
}

/// Shape of a JSON-RPC input after validation.
#[derive(Debug, Clone)]
pub enum ParsedRequests {
    /// Single request
    Single(JsonRpcRequest),
    /// Non-empty batch whose every element is a valid request
    Batch(Vec<JsonRpcRequest>),
}

/// Validate a JSON value as a single request or a batch.
///
/// A batch is accepted only when the array is non-empty and every element
/// is a valid request. Anything else is an `InvalidRequest`.
///
/// # Errors
///
/// Returns `RpcError::InvalidRequest` describing the first problem found.
pub fn parse_requests(value: &Value) -> Result<ParsedRequests, RpcError> {
    match value {
        Value::Array(items) if items.is_empty() => Err(RpcError::InvalidRequest {
            details: "Empty batch is not allowed".to_string(),
        }),
        Value::Array(items) => items
            .iter()
            .map(parse_single_request)
            .collect::<Result<Vec<_>, _>>()
            .map(ParsedRequests::Batch),
        Value::Object(_) => parse_single_request(value).map(ParsedRequests::Single),
        _ => Err(RpcError::InvalidRequest {
            details: "Request must be an object or array".to_string(),
        }),
    }
}

/// Parse a single JSON-RPC 2.0 request from a JSON value.
///
/// # Errors
///
/// Returns `RpcError::InvalidRequest` on any structural problem: missing or
/// wrong `jsonrpc`, missing `method`, float or structured `id`, or
/// non-structured `params`.
pub fn parse_single_request(value: &Value) -> Result<JsonRpcRequest, RpcError> {
    let raw = RawJsonRpcRequest::deserialize(value).map_err(|e| RpcError::InvalidRequest {
        details: format!("Invalid JSON-RPC structure: {}", e),
    })?;

    match raw.jsonrpc.as_deref() {
        Some(JSONRPC_VERSION) => {}
        Some(v) => {
            return Err(RpcError::InvalidRequest {
                details: format!("Invalid jsonrpc version: expected \"2.0\", got \"{}\"", v),
            });
        }
        None => {
            return Err(RpcError::InvalidRequest {
                details: "Missing required field: jsonrpc".to_string(),
            });
        }
    }

    let method = raw.method.ok_or_else(|| RpcError::InvalidRequest {
        details: "Missing required field: method".to_string(),
    })?;

    if let Some(params) = &raw.params {
        if !(params.is_array() || params.is_object()) {
            return Err(RpcError::InvalidRequest {
                details: "params must be an array or object".to_string(),
            });
        }
    }

    Ok(JsonRpcRequest {
        jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
        id: raw.id,
        method,
        params: raw.params,
    })
}

//! Error handling for the JSON-RPC engine.
//!
//! This module defines the closed set of errors a JSON-RPC exchange can
//! produce and their conversion into JSON-RPC 2.0 error objects.
//!
//! ## Module Organization
//!
//! - `jsonrpc` - JSON-RPC 2.0 error object
//! - `RpcError` - engine and handler error types
//!
//! Component errors (URI codec, router, store, relay, client) live next to
//! the component that raises them.

pub mod jsonrpc;

use jsonrpc::JsonRpcError;
use serde_json::Value;
use thiserror::Error;

/// Standard JSON-RPC 2.0 error codes.
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// All error types a JSON-RPC exchange can produce.
///
/// Each variant maps to a JSON-RPC error code and a data payload. Method
/// handlers may return `Application` (wrapped in `anyhow::Error`) to reply
/// with their own code, message, and data.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RpcError {
    /// Invalid JSON in request body.
    #[error("Parse error")]
    ParseError {
        /// Description of the parse error
        details: String,
    },

    /// Input is neither a request nor a non-empty batch of requests.
    #[error("Invalid Request")]
    InvalidRequest {
        /// Description of what makes the request invalid
        details: String,
    },

    /// The requested method is not registered.
    #[error("Method not found")]
    MethodNotFound {
        /// The method name that was not found
        method: String,
    },

    /// The method parameters failed validation.
    #[error("Invalid params")]
    InvalidParams {
        /// Description of the parameter validation failure
        details: String,
    },

    /// The handler failed or panicked.
    #[error("Internal error")]
    InternalError {
        /// Failure detail reported to the caller
        details: String,
    },

    /// Handler-defined error forwarded verbatim.
    #[error("{message}")]
    Application {
        code: i32,
        message: String,
        data: Option<Value>,
    },
}

impl RpcError {
    /// Maps error to JSON-RPC 2.0 error code.
    pub fn to_jsonrpc_code(&self) -> i32 {
        match self {
            Self::ParseError { .. } => codes::PARSE_ERROR,
            Self::InvalidRequest { .. } => codes::INVALID_REQUEST,
            Self::MethodNotFound { .. } => codes::METHOD_NOT_FOUND,
            Self::InvalidParams { .. } => codes::INVALID_PARAMS,
            Self::InternalError { .. } => codes::INTERNAL_ERROR,
            Self::Application { code, .. } => *code,
        }
    }

    /// Returns the error type name for logging.
    pub fn error_type_name(&self) -> &'static str {
        match self {
            Self::ParseError { .. } => "parse_error",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::MethodNotFound { .. } => "method_not_found",
            Self::InvalidParams { .. } => "invalid_params",
            Self::InternalError { .. } => "internal_error",
            Self::Application { .. } => "application_error",
        }
    }

    /// Returns the `data` payload of the error object.
    pub fn data(&self) -> Option<Value> {
        match self {
            Self::MethodNotFound { method } => Some(serde_json::json!({ "method": method })),
            Self::ParseError { details }
            | Self::InvalidRequest { details }
            | Self::InvalidParams { details }
            | Self::InternalError { details } => {
                Some(serde_json::json!({ "details": details }))
            }
            Self::Application { data, .. } => data.clone(),
        }
    }

    /// Converts error to a JSON-RPC error object.
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        JsonRpcError {
            code: self.to_jsonrpc_code(),
            message: self.to_string(),
            data: self.data(),
        }
    }
}

impl From<JsonRpcError> for RpcError {
    fn from(error: JsonRpcError) -> Self {
        Self::Application {
            code: error.code,
            message: error.message,
            data: error.data,
        }
    }
}

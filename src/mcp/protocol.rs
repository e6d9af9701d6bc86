//! JSON-RPC 2.0 message types for MCP protocol.
//!
//! This module defines the envelopes exchanged with clients. Decoding is done
//! in two steps so that a malformed envelope can still be answered with the
//! caller's `id`:
//!
//! 1. [`decode_line`] turns raw text into JSON (`-32700` on failure)
//! 2. [`parse_envelope`] validates the JSON-RPC shape (`-32600` on failure)
//!
//! Whether a reply is sent is decided by method name, not by the presence of
//! an `id`: only `notifications/initialized` is silent.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// The MCP protocol version used when a client does not request one.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name for capability negotiation.
pub const SERVER_NAME: &str = "openrouter-image-mcp";

/// A JSON-RPC 2.0 request ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID, kept exactly as received.
    Number(Number),
    /// String request ID.
    String(String),
}

impl RequestId {
    /// Recovers an ID from raw JSON. `null`, absent, and anything that is not
    /// a number or string yield `None`.
    #[must_use]
    pub fn from_value(value: Option<&Value>) -> Option<Self> {
        match value? {
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// A validated incoming envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Request identifier; `None` serialises as `null` in replies.
    pub id: Option<RequestId>,

    /// The method to invoke.
    pub method: String,

    /// Optional parameters for the method.
    pub params: Option<Value>,
}

/// A successful JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this response corresponds to.
    pub id: Option<RequestId>,

    /// The result of the method call.
    pub result: Value,
}

impl JsonRpcResponse {
    /// Creates a new success response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Value is not const-compatible
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result,
        }
    }
}

/// Standard JSON-RPC 2.0 error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received by the server.
    ParseError,
    /// The JSON sent is not a valid Request object.
    InvalidRequest,
    /// The method does not exist or is not available.
    MethodNotFound,
    /// Invalid method parameters.
    InvalidParams,
    /// Internal JSON-RPC error.
    InternalError,
    /// A tool operation failed (backend, filesystem, sandbox).
    OperationFailed,
}

impl ErrorCode {
    /// Returns the numeric code for this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::OperationFailed => -32000,
        }
    }

    /// Returns the default message for this error code.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::OperationFailed => "Operation failed",
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorData {
    /// The error code.
    pub code: i32,

    /// A short description of the error.
    pub message: String,

    /// Additional information about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    /// Creates a new error from an error code.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.default_message().to_string(),
            data: None,
        }
    }

    /// Creates a new error with a custom message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Adds additional data to the error.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A JSON-RPC 2.0 error response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this error corresponds to; `null` if unrecoverable.
    pub id: Option<RequestId>,

    /// The error details.
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    /// Creates a new error response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // JsonRpcErrorData contains String
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            error,
        }
    }

    /// Creates a parse error response carrying the decoder message.
    #[must_use]
    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::new(
            None,
            JsonRpcErrorData::from_code(ErrorCode::ParseError).with_data(Value::String(detail.into())),
        )
    }

    /// Creates an invalid request error response.
    #[must_use]
    pub fn invalid_request(id: Option<RequestId>) -> Self {
        Self::new(id, JsonRpcErrorData::from_code(ErrorCode::InvalidRequest))
    }

    /// Creates a method not found error response.
    #[must_use]
    pub fn method_not_found(id: Option<RequestId>) -> Self {
        Self::new(id, JsonRpcErrorData::from_code(ErrorCode::MethodNotFound))
    }

    /// Creates an invalid params error response naming `field`.
    #[must_use]
    pub fn invalid_params(id: Option<RequestId>, data: Value) -> Self {
        Self::new(
            id,
            JsonRpcErrorData::from_code(ErrorCode::InvalidParams).with_data(data),
        )
    }

    /// Creates an operation-failure response.
    #[must_use]
    pub fn operation_failed(id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self::new(
            id,
            JsonRpcErrorData::with_message(ErrorCode::OperationFailed, message),
        )
    }
}

/// Any reply the server sends.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JsonRpcReply {
    /// Success.
    Response(JsonRpcResponse),
    /// Failure.
    Error(JsonRpcError),
}

impl JsonRpcReply {
    /// The numeric error code, if this is an error.
    #[must_use]
    pub const fn error_code(&self) -> Option<i32> {
        match self {
            Self::Response(_) => None,
            Self::Error(e) => Some(e.error.code),
        }
    }
}

impl From<JsonRpcResponse> for JsonRpcReply {
    fn from(value: JsonRpcResponse) -> Self {
        Self::Response(value)
    }
}

impl From<JsonRpcError> for JsonRpcReply {
    fn from(value: JsonRpcError) -> Self {
        Self::Error(value)
    }
}

/// Decodes one line of text into JSON.
///
/// # Errors
///
/// Returns a `-32700` error carrying the decoder message.
pub fn decode_line(line: &str) -> Result<Value, JsonRpcError> {
    serde_json::from_str(line).map_err(|e| JsonRpcError::parse_error(e.to_string()))
}

/// Validates the JSON-RPC shape of a decoded value.
///
/// # Errors
///
/// Returns a `-32600` error keyed to the envelope's `id` (or `null`) if the
/// value is not an object, `jsonrpc` is not `"2.0"`, or `method` is not a
/// string.
pub fn parse_envelope(value: Value) -> Result<Envelope, JsonRpcError> {
    let Value::Object(mut obj) = value else {
        return Err(JsonRpcError::invalid_request(None));
    };

    let id = RequestId::from_value(obj.get("id"));

    if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return Err(JsonRpcError::invalid_request(id));
    }

    let Some(Value::String(method)) = obj.remove("method") else {
        return Err(JsonRpcError::invalid_request(id));
    };

    let params = obj.remove("params").filter(|p| !p.is_null());

    Ok(Envelope { id, method, params })
}

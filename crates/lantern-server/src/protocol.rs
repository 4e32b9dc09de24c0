//! JSON-RPC 2.0 message types and call status codes.
//!
//! Unary calls answer with a regular response. Streaming calls send one
//! `stream.item` notification per item and end with a response whose
//! result is `{"done": true}`, or with an error response.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Error code for unknown or unimplemented methods.
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
/// No object matches the query.
pub const NOT_FOUND: i32 = -32001;
/// The query matches more than one object.
pub const FAILED_PRECONDITION: i32 = -32002;
pub const REQUEST_CANCELLED: i32 = -32800;

/// Method name of stream item notifications.
pub const STREAM_ITEM: &str = "stream.item";
/// Method name clients use to cancel an in-flight call.
pub const CANCEL: &str = "$/cancel";

// ─────────────────────────────────────────────────────────────────────────────
// Wire messages
// ─────────────────────────────────────────────────────────────────────────────

/// A JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// The error object of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl Response {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn parse_error() -> Self {
        Self::error(Value::Null, PARSE_ERROR, "Parse error")
    }

    pub fn method_not_found(id: Value, method: &str) -> Self {
        Self::error(id, METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn from_status(id: Value, status: &Status) -> Self {
        Self::error(id, status.code.rpc_code(), status.message.clone())
    }
}

/// A JSON-RPC notification (no id, no reply expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Notification {
    /// One item of the stream started by request `id`.
    pub fn stream_item(id: Value, item: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: STREAM_ITEM.to_string(),
            params: serde_json::json!({
                "id": id,
                "item": item,
                "timestamp": chrono::Utc::now().timestamp_millis(),
            }),
        }
    }
}

/// Something the server sends back on a connection.
#[derive(Debug, Clone)]
pub enum Outbound {
    Result { id: Value, result: Value },
    Error { id: Value, status: Status },
    Item { id: Value, item: Value },
    /// A response produced outside any call, such as a parse error.
    Raw(Response),
}

impl Outbound {
    /// Renders the JSON-RPC text frame.
    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            Outbound::Result { id, result } => {
                serde_json::to_string(&Response::success(id.clone(), result.clone()))
            }
            Outbound::Error { id, status } => {
                serde_json::to_string(&Response::from_status(id.clone(), status))
            }
            Outbound::Item { id, item } => {
                serde_json::to_string(&Notification::stream_item(id.clone(), item.clone()))
            }
            Outbound::Raw(response) => serde_json::to_string(response),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Status
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome category of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Ok,
    Cancelled,
    InvalidArgument,
    NotFound,
    FailedPrecondition,
    Unimplemented,
    Internal,
}

impl StatusCode {
    /// The JSON-RPC error code reported for this status.
    pub fn rpc_code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Cancelled => REQUEST_CANCELLED,
            Self::InvalidArgument => INVALID_PARAMS,
            Self::NotFound => NOT_FOUND,
            Self::FailedPrecondition => FAILED_PRECONDITION,
            Self::Unimplemented => METHOD_NOT_FOUND,
            Self::Internal => INTERNAL_ERROR,
        }
    }
}

/// Final status of a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: StatusCode,
    pub message: String,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::Ok, "")
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusCode::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Internal, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unimplemented, message)
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl From<lantern_core::Error> for Status {
    fn from(e: lantern_core::Error) -> Self {
        use lantern_core::Error;
        let code = match &e {
            Error::NotFound(_) => StatusCode::NotFound,
            Error::Ambiguous { .. } => StatusCode::FailedPrecondition,
            Error::InvalidArgument(_) => StatusCode::InvalidArgument,
            Error::Cancelled(_) => StatusCode::Cancelled,
            Error::Fatal(_) => StatusCode::Internal,
        };
        Self::new(code, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_from_core_error() {
        let status: Status = lantern_core::Error::Ambiguous {
            query: "{}".into(),
            count: 3,
        }
        .into();
        assert_eq!(status.code, StatusCode::FailedPrecondition);
        assert_eq!(status.code.rpc_code(), FAILED_PRECONDITION);

        let status: Status = lantern_core::Error::NotFound("x".into()).into();
        assert_eq!(status.code.rpc_code(), NOT_FOUND);

        let status: Status = lantern_core::Error::Cancelled("going away".into()).into();
        assert_eq!(status.code.rpc_code(), REQUEST_CANCELLED);
        assert!(status.message.contains("going away"));
    }

    #[test]
    fn test_outbound_frames() {
        let frame = Outbound::Error {
            id: json!(4),
            status: Status::invalid_argument("bad"),
        }
        .to_json()
        .unwrap();
        let response: Response = serde_json::from_str(&frame).unwrap();
        assert_eq!(response.id, json!(4));
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
        assert!(response.result.is_none());

        let frame = Outbound::Item {
            id: json!("s1"),
            item: json!({"type": "removed"}),
        }
        .to_json()
        .unwrap();
        let note: Notification = serde_json::from_str(&frame).unwrap();
        assert_eq!(note.method, STREAM_ITEM);
        assert_eq!(note.params["id"], json!("s1"));
        assert!(note.params["timestamp"].is_i64());
    }

    #[test]
    fn test_request_defaults() {
        let request: Request =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"observer.start"}"#).unwrap();
        assert_eq!(request.id, Value::Null);
        assert_eq!(request.params, Value::Null);
    }
}

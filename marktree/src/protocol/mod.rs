//! Request/response protocol
//!
//!     Requests arrive in the bridge envelope
//!
//!         { "id": "7", "type": "request", "payload": { "type": "structure.getAst", ...args } }
//!
//!     and every request gets exactly one flat response carrying the same id:
//!
//!         { "id": "7", "success": true, "data": { ... } }
//!         { "id": "7", "success": false, "error": "not_found", "message": "...", "recovery": "..." }
//!
//!     Envelopes of any other `type` (the bridge's `identify` handshake, for instance) are not
//!     requests and get no response.
//!
//!     The [`Dispatcher`] owns the document session, so requests are handled strictly one at a
//!     time. That is what makes the mutation pipeline (validate, resolve, execute) atomic with
//!     respect to other requests: nothing can interleave with a mutation between its revision
//!     check and its commit.

mod dispatch;
pub mod limits;

pub use dispatch::Dispatcher;
pub use limits::{Limits, RateLimiter};

use crate::error::{ErrorCode, ProtocolError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Protocol version advertised in capabilities.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Every operation the dispatcher understands.
pub const OPERATIONS: [&str; 28] = [
    "protocol.getCapabilities",
    "protocol.getRevision",
    "document.getContent",
    "structure.getAst",
    "structure.getDigest",
    "structure.listBlocks",
    "structure.resolveTargets",
    "structure.getSection",
    "cursor.toOffset",
    "cursor.toPosition",
    "mutation.batchEdit",
    "mutation.applyDiff",
    "mutation.replaceAnchored",
    "section.update",
    "section.insert",
    "section.move",
    "table.batchModify",
    "list.batchModify",
    "suggestion.list",
    "suggestion.accept",
    "suggestion.reject",
    "suggestion.acceptAll",
    "suggestion.rejectAll",
    "suggestion.focus",
    "suggestion.focusNext",
    "suggestion.focusPrev",
    "document.setContent",
    "document.retry",
];

/// Operations that never change the document or the revision.
pub fn is_read_only_operation(request_type: &str) -> bool {
    matches!(
        request_type,
        "protocol.getCapabilities"
            | "protocol.getRevision"
            | "document.getContent"
            | "structure.getAst"
            | "structure.getDigest"
            | "structure.listBlocks"
            | "structure.resolveTargets"
            | "structure.getSection"
            | "cursor.toOffset"
            | "cursor.toPosition"
            | "suggestion.list"
    )
}

/// The transport wrapper around a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub payload: Value,
}

/// A request split into its operation name and arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub request_type: String,
    pub args: Value,
}

impl Request {
    /// Split a payload object into `type` and the remaining fields.
    pub fn from_payload(payload: Value) -> Result<Self, ProtocolError> {
        let Value::Object(mut fields) = payload else {
            return Err(ProtocolError::invalid_operation("request payload must be an object"));
        };
        let request_type = match fields.remove("type") {
            Some(Value::String(name)) => name,
            _ => {
                return Err(ProtocolError::invalid_operation(
                    "request payload must have a string 'type' field",
                ))
            }
        };
        Ok(Request {
            request_type,
            args: Value::Object(fields),
        })
    }

    pub fn new(request_type: impl Into<String>, args: Value) -> Self {
        Request {
            request_type: request_type.into(),
            args: match args {
                Value::Null => Value::Object(Map::new()),
                other => other,
            },
        }
    }
}

/// Flat response for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery: Option<String>,
}

impl Response {
    pub fn success(id: impl Into<String>, data: Value) -> Self {
        Response {
            id: id.into(),
            success: true,
            data: Some(data),
            error: None,
            message: None,
            details: None,
            recovery: None,
        }
    }

    pub fn failure(id: impl Into<String>, err: ProtocolError) -> Self {
        Response {
            id: id.into(),
            success: false,
            data: None,
            error: Some(err.code.as_str().to_string()),
            message: Some(err.message),
            details: err.details,
            recovery: err.recovery,
        }
    }

    /// The error code of a failed response.
    pub fn error_code(&self) -> Option<ErrorCode> {
        let code = self.error.as_deref()?;
        ErrorCode::ALL.into_iter().find(|c| c.as_str() == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_splits_into_type_and_args() {
        let request = Request::from_payload(json!({ "type": "structure.getAst", "limit": 3 })).unwrap();
        assert_eq!(request.request_type, "structure.getAst");
        assert_eq!(request.args, json!({ "limit": 3 }));
        assert!(Request::from_payload(json!({ "limit": 3 })).is_err());
        assert!(Request::from_payload(json!("x")).is_err());
    }

    #[test]
    fn failures_are_flat() {
        let response = Response::failure("9", ProtocolError::conflict("r4"));
        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(wire["success"], false);
        assert_eq!(wire["error"], "conflict");
        assert_eq!(wire["details"]["currentRevision"], "r4");
        assert!(wire.get("data").is_none());
        assert_eq!(response.error_code(), Some(ErrorCode::Conflict));
    }

    #[test]
    fn read_only_set_covers_queries_only() {
        assert!(is_read_only_operation("structure.getDigest"));
        assert!(is_read_only_operation("suggestion.list"));
        assert!(!is_read_only_operation("suggestion.accept"));
        assert!(!is_read_only_operation("mutation.batchEdit"));
        for op in OPERATIONS {
            if op.starts_with("structure.") {
                assert!(is_read_only_operation(op), "{op}");
            }
        }
    }
}

//! Error types for format and protocol operations
//!
//! Two layers of errors live here. [`FormatError`] covers the markdown/JSON pipeline and the
//! format registry. [`ProtocolError`] is the structured failure every query and mutation
//! reports, carrying one of the closed [`ErrorCode`] values that go out on the wire.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during format operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatError {
    /// Format not found in registry
    #[error("Format '{0}' not found")]
    FormatNotFound(String),
    /// Error during parsing
    #[error("Parse error: {0}")]
    ParseError(String),
    /// Error during serialization
    #[error("Serialization error: {0}")]
    SerializationError(String),
    /// Format does not support the operation
    #[error("Operation not supported: {0}")]
    NotSupported(String),
}

/// Closed set of failure codes reported to protocol callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    AmbiguousTarget,
    Conflict,
    InvalidSelector,
    TooLarge,
    RateLimited,
    InvalidOperation,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 7] = [
        ErrorCode::NotFound,
        ErrorCode::AmbiguousTarget,
        ErrorCode::Conflict,
        ErrorCode::InvalidSelector,
        ErrorCode::TooLarge,
        ErrorCode::RateLimited,
        ErrorCode::InvalidOperation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "not_found",
            ErrorCode::AmbiguousTarget => "ambiguous_target",
            ErrorCode::Conflict => "conflict",
            ErrorCode::InvalidSelector => "invalid_selector",
            ErrorCode::TooLarge => "too_large",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::InvalidOperation => "invalid_operation",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed query or mutation, in the shape the transport reports it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{code}: {message}")]
pub struct ProtocolError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<Value>,
    pub recovery: Option<String>,
}

impl ProtocolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ProtocolError {
            code,
            message: message.into(),
            details: None,
            recovery: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_recovery(mut self, recovery: impl Into<String>) -> Self {
        self.recovery = Some(recovery.into());
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
            .with_recovery("Re-query the document structure and retry with a fresh target")
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidOperation, message)
    }

    pub fn invalid_selector(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidSelector, message)
    }

    /// More than one node fits the target; `candidates` go back to the caller to pick from.
    pub fn ambiguous(message: impl Into<String>, candidates: Value) -> Self {
        Self::new(ErrorCode::AmbiguousTarget, message)
            .with_details(serde_json::json!({ "candidates": candidates }))
            .with_recovery("Narrow the target (by id, level or more text) and retry")
    }

    pub fn too_large(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TooLarge, message)
            .with_recovery("Split the request to stay within the advertised limits")
    }

    pub fn rate_limited(limit: usize) -> Self {
        Self::new(
            ErrorCode::RateLimited,
            format!("More than {limit} requests in the last second"),
        )
        .with_recovery("Wait a moment and retry")
    }

    pub fn conflict(current_revision: &str) -> Self {
        Self::new(
            ErrorCode::Conflict,
            "Document changed since baseRevision was read",
        )
        .with_details(serde_json::json!({ "currentRevision": current_revision }))
        .with_recovery("Fetch the current revision, re-read the affected content and retry")
    }
}

impl From<FormatError> for ProtocolError {
    fn from(err: FormatError) -> Self {
        ProtocolError::invalid_operation(err.to_string())
    }
}

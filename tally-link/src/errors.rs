//! Error types for the tally-link library.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Declared failure kinds surfaced to callers.
///
/// These are the wire-level classification carried inside relay error
/// responses; the UI layer branches on them (e.g. `Unreachable` vs `Disabled`
/// produce different user messages).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Liveness probe failed or the connection was refused.
    Unreachable,
    /// A request did not complete within its timeout.
    RequestTimeout,
    /// HTML instead of XML, or XML that fails to parse.
    MalformedPayload,
    /// Upstream answered with a non-success status or a request-level error.
    UpstreamRejected,
    /// The relay detection handshake produced no reply in time.
    DetectionTimedOut,
    /// The integration is switched off in the executor configuration.
    Disabled,
    /// The executor could not persist its configuration.
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unreachable => "UNREACHABLE",
            ErrorKind::RequestTimeout => "REQUEST_TIMEOUT",
            ErrorKind::MalformedPayload => "MALFORMED_PAYLOAD",
            ErrorKind::UpstreamRejected => "UPSTREAM_REJECTED",
            ErrorKind::DetectionTimedOut => "DETECTION_TIMED_OUT",
            ErrorKind::Disabled => "DISABLED",
            ErrorKind::Storage => "STORAGE",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for the Tally client library.
#[derive(Debug, Error)]
pub enum TallyError {
    /// Connection refused, DNS failure, or failed liveness probe.
    #[error("Tally unreachable: {0}")]
    Unreachable(String),

    /// Operation timed out waiting for a response.
    #[error("Timeout: {0}")]
    RequestTimeout(String),

    /// Response body was an HTML page or unparseable XML.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Server answered with a non-success status.
    #[error("Upstream rejected request (status={status}): {message}")]
    UpstreamRejected { status: u16, message: String },

    /// No executor answered the detection handshake.
    #[error("Detection timed out after {0} ms")]
    DetectionTimedOut(u64),

    /// Integration is disabled in the executor configuration.
    #[error("Tally integration is disabled")]
    Disabled,

    /// Configuration could not be persisted.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl TallyError {
    /// The declared kind this error is classified as.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TallyError::Unreachable(_) => ErrorKind::Unreachable,
            TallyError::RequestTimeout(_) => ErrorKind::RequestTimeout,
            TallyError::MalformedPayload(_) => ErrorKind::MalformedPayload,
            TallyError::UpstreamRejected { .. } => ErrorKind::UpstreamRejected,
            TallyError::DetectionTimedOut(_) => ErrorKind::DetectionTimedOut,
            TallyError::Disabled => ErrorKind::Disabled,
            TallyError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<quick_xml::Error> for TallyError {
    fn from(e: quick_xml::Error) -> Self {
        TallyError::MalformedPayload(format!("XML parse error: {e}"))
    }
}

impl From<reqwest::Error> for TallyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TallyError::RequestTimeout(e.to_string())
        } else if let Some(status) = e.status() {
            TallyError::UpstreamRejected {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_decode() || e.is_body() {
            TallyError::MalformedPayload(e.to_string())
        } else {
            // connect errors, DNS failures, resets
            TallyError::Unreachable(e.to_string())
        }
    }
}

/// Convenience Result type for this library.
pub type Result<T> = std::result::Result<T, TallyError>;

//! Error types for the Tally engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building or configuring an engine.
///
/// Runtime failures (a failed write, a mismatched barcode) are never returned
/// as errors; they are surfaced as feedback commands instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("catalog belongs to session {catalog}, engine is configured for {configured}")]
    SessionMismatch { configured: String, catalog: String },

    #[error("invalid {field} identifier: {value:?}")]
    InvalidIdentifier { field: &'static str, value: String },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a failed remote write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WriteErrorKind {
    /// The backend rejected an identifier as malformed.
    InvalidId,
    /// Row-level security or another authorization rule refused the write.
    PermissionDenied,
    /// The request never reached the backend, or the device is offline.
    ConnectionLost,
    Other,
}

impl WriteErrorKind {
    /// Best-effort classification of a backend error message.
    ///
    /// Backends that can report a structured kind should construct
    /// [`WriteError::new`] directly; this exists for text-only error sources.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("row-level security") || lower.contains("permission") {
            WriteErrorKind::PermissionDenied
        } else if lower.contains("invalid input syntax for type uuid")
            || lower.contains("invalid uuid")
        {
            WriteErrorKind::InvalidId
        } else if lower.contains("network")
            || lower.contains("failed to fetch")
            || lower.contains("connection")
            || lower.contains("timed out")
        {
            WriteErrorKind::ConnectionLost
        } else {
            WriteErrorKind::Other
        }
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, WriteErrorKind::ConnectionLost | WriteErrorKind::Other)
    }
}

/// A failed write reported by a backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct WriteError {
    pub kind: WriteErrorKind,
    pub message: String,
}

impl WriteError {
    pub fn new(kind: WriteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build an error from message text alone, classifying it by content.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: WriteErrorKind::classify(&message),
            message,
        }
    }

    /// The synthetic failure used when the health signal reports offline.
    pub fn offline() -> Self {
        Self::new(WriteErrorKind::ConnectionLost, "device is offline")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::InvalidSettings("qty_per_scan must be positive".into());
        assert_eq!(
            err.to_string(),
            "invalid settings: qty_per_scan must be positive"
        );

        let err = Error::InvalidIdentifier {
            field: "item",
            value: "abc".into(),
        };
        assert_eq!(err.to_string(), "invalid item identifier: \"abc\"");
    }

    #[test]
    fn classify_messages() {
        assert_eq!(
            WriteErrorKind::classify("new row violates row-level security policy"),
            WriteErrorKind::PermissionDenied
        );
        assert_eq!(
            WriteErrorKind::classify("Permission denied for table inventory_count_items"),
            WriteErrorKind::PermissionDenied
        );
        assert_eq!(
            WriteErrorKind::classify("invalid input syntax for type uuid: \"undefined\""),
            WriteErrorKind::InvalidId
        );
        assert_eq!(
            WriteErrorKind::classify("TypeError: Failed to fetch"),
            WriteErrorKind::ConnectionLost
        );
        assert_eq!(
            WriteErrorKind::classify("duplicate key value"),
            WriteErrorKind::Other
        );
    }

    #[test]
    fn retryable_kinds() {
        assert!(WriteErrorKind::ConnectionLost.is_retryable());
        assert!(WriteErrorKind::Other.is_retryable());
        assert!(!WriteErrorKind::InvalidId.is_retryable());
        assert!(!WriteErrorKind::PermissionDenied.is_retryable());
    }

    #[test]
    fn write_error_from_message() {
        let err = WriteError::from_message("network error");
        assert_eq!(err.kind, WriteErrorKind::ConnectionLost);
        assert_eq!(err.to_string(), "network error");
        assert_eq!(WriteError::offline().kind, WriteErrorKind::ConnectionLost);
    }
}

//! Error types for doclink.
//!
//! Every failure a caller can observe is a [`DocLinkError`]. The enum is
//! `Clone` so one failure (a rejected room subscribe, a session close) can be
//! delivered to every waiter it concerns.

use thiserror::Error;

/// Result type for doclink operations.
pub type Result<T> = std::result::Result<T, DocLinkError>;

/// Errors that can occur while talking to the backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocLinkError {
    /// Request attempted while the session is not connected and could not be queued.
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// No response arrived before the deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The offline queue is full and the policy rejects new entries.
    #[error("Offline queue is full (capacity {capacity})")]
    QueueCapacity { capacity: usize },

    /// The request was evicted or flushed out of the offline queue.
    #[error("Request discarded from offline queue: {0}")]
    QueueDiscarded(String),

    /// The request spent longer than its TTL in the offline queue.
    #[error("Request expired in offline queue: {0}")]
    QueueExpired(String),

    /// The session was closed while the request or room was pending.
    #[error("Session closed")]
    Closed,

    /// The backend rejected a subscribe or unsubscribe call.
    #[error("Subscription error: {0}")]
    SubscriptionError(String),

    /// The backend answered with an error payload.
    #[error("Server error ({status_code}): {message}")]
    ServerError { status_code: u16, message: String },

    /// The transport failed to open, send, or stay connected.
    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The request itself is malformed (e.g. duplicate request id).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The caller abandoned the operation.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl DocLinkError {
    /// Shorthand for the error returned when the session task has gone away.
    pub(crate) fn task_gone() -> Self {
        DocLinkError::InternalError("Session task is not running".to_string())
    }

    /// Returns `true` for errors produced by the offline queue admission policy.
    pub fn is_queue_error(&self) -> bool {
        matches!(
            self,
            DocLinkError::QueueCapacity { .. }
                | DocLinkError::QueueDiscarded(_)
                | DocLinkError::QueueExpired(_)
        )
    }
}

impl From<serde_json::Error> for DocLinkError {
    fn from(err: serde_json::Error) -> Self {
        DocLinkError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            DocLinkError::QueueCapacity { capacity: 2 }.to_string(),
            "Offline queue is full (capacity 2)"
        );
        assert_eq!(
            DocLinkError::ServerError {
                status_code: 404,
                message: "missing".into()
            }
            .to_string(),
            "Server error (404): missing"
        );
        assert_eq!(DocLinkError::Closed.to_string(), "Session closed");
    }

    #[test]
    fn test_queue_error_classification() {
        assert!(DocLinkError::QueueCapacity { capacity: 1 }.is_queue_error());
        assert!(DocLinkError::QueueDiscarded("x".into()).is_queue_error());
        assert!(DocLinkError::QueueExpired("x".into()).is_queue_error());
        assert!(!DocLinkError::Closed.is_queue_error());
    }

    #[test]
    fn test_from_serde_error() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let converted: DocLinkError = err.into();
        assert!(matches!(converted, DocLinkError::SerializationError(_)));
    }
}

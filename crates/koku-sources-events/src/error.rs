//! Error types for the koku-sources-events crate.

use thiserror::Error;

/// Errors that can occur while consuming the source event stream.
#[derive(Debug, Error)]
pub enum EventError {
    // Configuration errors (permanent, no retry)
    /// Required configuration variable is missing.
    #[error("Configuration missing: {var}")]
    ConfigMissing { var: String },

    /// Configuration value is invalid.
    #[error("Configuration invalid for {var}: {reason}")]
    ConfigInvalid { var: String, reason: String },

    // Connection errors (transient, retry with backoff)
    /// Failed to connect to Kafka broker.
    #[error("Connection to broker {broker} failed: {cause}")]
    ConnectionFailed { broker: String, cause: String },

    // Consuming errors
    /// Failed to consume from topic.
    #[error("Failed to consume from topic {topic}: {cause}")]
    ConsumeFailed { topic: String, cause: String },

    /// Failed to commit a consumed offset.
    #[error("Failed to commit offset {offset} on topic {topic}: {cause}")]
    CommitFailed {
        topic: String,
        offset: i64,
        cause: String,
    },

    /// Message payload could not be interpreted.
    #[error("Invalid message payload: {reason}")]
    InvalidPayload { reason: String },

    /// Event handler refused a classified event.
    #[error("Handler failed for message at offset {offset}: {cause}")]
    HandlerFailed { offset: i64, cause: String },
}

impl EventError {
    /// Returns true if this error is transient and can be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EventError::ConnectionFailed { .. }
                | EventError::ConsumeFailed { .. }
                | EventError::CommitFailed { .. }
                | EventError::HandlerFailed { .. }
        )
    }
}

/// Result type for event operations.
pub type EventResult<T> = Result<T, EventError>;

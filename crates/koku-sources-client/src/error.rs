//! Client error types.
//!
//! Errors are split into recoverable (network, timeout, 5xx) and
//! non-recoverable (4xx, malformed responses) for retry decisions.

use thiserror::Error;

/// Error from a source registry or provider-management call.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced a response (connect failure, timeout, reset).
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("unexpected response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    /// A lookup returned no data.
    #[error("no {what} found for {key}")]
    Missing { what: &'static str, key: String },

    /// The client could not be configured.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl ClientError {
    /// Build a `Missing` error.
    pub fn missing(what: &'static str, key: impl ToString) -> Self {
        Self::Missing {
            what,
            key: key.to_string(),
        }
    }

    /// Returns true if the call may succeed when retried later.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::InvalidResponse { .. } | Self::Missing { .. } | Self::InvalidConfiguration { .. } => {
                false
            }
        }
    }

    /// Returns true if the remote object does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. } | Self::Missing { .. })
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

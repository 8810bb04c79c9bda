//! Synchronization error types.

use koku_sources_client::ClientError;
use koku_sources_db::{DbError, SourceType};
use thiserror::Error;

/// Error raised while enriching or executing a source operation.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Source record store failure.
    #[error("store error: {0}")]
    Store(#[from] DbError),

    /// Source registry or provider-management call failed.
    #[error("{0}")]
    Client(#[from] ClientError),

    /// The registry reported a source type the integration does not handle.
    #[error("unsupported source type '{type_name}' for source {source_id}")]
    UnsupportedSourceType { source_id: i64, type_name: String },

    /// The record lacks a field the operation needs.
    #[error("source {source_id} ({source_type}) is missing {field}")]
    IncompleteRecord {
        source_id: i64,
        source_type: SourceType,
        field: &'static str,
    },

    /// The engine has shut down and no longer accepts work.
    #[error("synchronization engine is shut down")]
    ShutDown,
}

impl SyncError {
    /// Returns true if the failed operation should be retried after a delay.
    ///
    /// Store failures are recoverable; client failures follow the
    /// client's classification.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Store(_) => true,
            Self::Client(e) => e.is_recoverable(),
            Self::UnsupportedSourceType { .. } | Self::IncompleteRecord { .. } | Self::ShutDown => {
                false
            }
        }
    }
}

/// Result type for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;

//! Error types for the koku-sources-db crate.
//!
//! Wraps `SQLx` errors with enough context for the sync engine to decide
//! whether a failed store call is worth retrying.

use thiserror::Error;

/// Source store errors.
///
/// # Example
///
/// ```rust
/// use koku_sources_db::DbError;
///
/// fn describe(err: &DbError) -> &'static str {
///     if err.is_transient() {
///         "retry later"
///     } else {
///         "give up"
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to establish or acquire a database connection.
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[source] sqlx::Error),

    /// A database migration failed to apply.
    #[error("Migration failed: {0}")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),

    /// A database query failed to execute.
    #[error("Query failed: {0}")]
    QueryFailed(#[source] sqlx::Error),

    /// The source record does not exist.
    #[error("Source not found: {0}")]
    NotFound(i64),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DbError::ConnectionFailed(err)
            }
            other => DbError::QueryFailed(other),
        }
    }
}

impl DbError {
    /// Check if this error indicates a missing source record.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound(_))
    }

    /// Returns true if retrying the same call may succeed.
    ///
    /// Connection problems and serialization conflicts under concurrent
    /// writers are transient; a missing row is not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::ConnectionFailed(_) => true,
            DbError::QueryFailed(sqlx::Error::Database(db_err)) => {
                // 40001 serialization_failure, 40P01 deadlock_detected
                matches!(db_err.code().as_deref(), Some("40001" | "40P01"))
            }
            _ => false,
        }
    }
}

/// Result type for store operations.
pub type DbResult<T> = Result<T, DbError>;

//! Source record store.
//!
//! Every mutation of persisted source state goes through [`SourceStore`].
//! Each operation is individually atomic and idempotent, so workers can
//! redeliver the same event without creating a second record or clearing
//! a flag twice.

use async_trait::async_trait;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::models::{SourceRecord, SourceType};
use crate::pool::DbPool;

/// Durable store of known sources and their pending operations.
#[async_trait]
pub trait SourceStore: Send + Sync + 'static {
    /// Create a bare pending record if absent.
    ///
    /// An existing record is left as is apart from its offset, which only
    /// moves forward. Returns true if a record was created.
    async fn upsert_pending_create(
        &self,
        source_id: i64,
        auth_header: Option<&str>,
        offset: i64,
    ) -> DbResult<bool>;

    /// Flag a provisioned source for update.
    ///
    /// Returns false when the source is unknown or not yet provisioned.
    async fn mark_pending_update(&self, source_id: i64, offset: i64) -> DbResult<bool>;

    /// Flag a source for deletion. Returns false when the source is unknown.
    async fn mark_pending_delete(&self, source_id: i64, offset: i64) -> DbResult<bool>;

    /// Store name, type and endpoint resolved from the source registry.
    async fn set_type_and_context(
        &self,
        source_id: i64,
        name: &str,
        source_type: SourceType,
        endpoint_id: i64,
    ) -> DbResult<()>;

    /// Store the credential payload.
    async fn set_authentication(
        &self,
        source_id: i64,
        authentication: &serde_json::Value,
    ) -> DbResult<()>;

    /// Store the billing location payload.
    async fn set_billing_source(
        &self,
        source_id: i64,
        billing_source: &serde_json::Value,
    ) -> DbResult<()>;

    /// Record the provider UUID after a successful create; clears `pending_create`.
    async fn set_provider_uuid(&self, source_id: i64, provider_uuid: Uuid) -> DbResult<()>;

    /// Clear `pending_update` after a successful update.
    async fn clear_update_flag(&self, source_id: i64) -> DbResult<()>;

    /// Remove the record after a successful destroy.
    ///
    /// Returns true if a record was removed.
    async fn remove(&self, source_id: i64) -> DbResult<bool>;

    /// Fetch the current record.
    async fn get(&self, source_id: i64) -> DbResult<Option<SourceRecord>>;

    /// All records with any pending flag, ordered by source ID.
    async fn load_pending(&self) -> DbResult<Vec<SourceRecord>>;

    /// Resolved type of a source, if the source is known.
    async fn lookup_source_type(&self, source_id: i64) -> DbResult<Option<SourceType>>;

    /// Source that owns a registry endpoint.
    async fn lookup_source_for_endpoint(&self, endpoint_id: i64) -> DbResult<Option<i64>>;
}

/// PostgreSQL-backed [`SourceStore`].
///
/// Concurrency control is left to PostgreSQL: every operation is one
/// statement, so concurrent writers serialize on the row lock.
#[derive(Debug, Clone)]
pub struct PgSourceStore {
    pool: DbPool,
}

impl PgSourceStore {
    /// Create a store over the given pool.
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Borrow the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn require_row(source_id: i64, matched: bool) -> DbResult<()> {
    if matched {
        Ok(())
    } else {
        Err(DbError::NotFound(source_id))
    }
}

#[async_trait]
impl SourceStore for PgSourceStore {
    #[instrument(skip(self, auth_header))]
    async fn upsert_pending_create(
        &self,
        source_id: i64,
        auth_header: Option<&str>,
        offset: i64,
    ) -> DbResult<bool> {
        let created =
            SourceRecord::insert_if_absent(self.pool.inner(), source_id, auth_header, offset)
                .await?;
        debug!(created, "Upserted pending source");
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn mark_pending_update(&self, source_id: i64, offset: i64) -> DbResult<bool> {
        Ok(SourceRecord::flag_update(self.pool.inner(), source_id, offset).await?)
    }

    #[instrument(skip(self))]
    async fn mark_pending_delete(&self, source_id: i64, offset: i64) -> DbResult<bool> {
        Ok(SourceRecord::flag_delete(self.pool.inner(), source_id, offset).await?)
    }

    #[instrument(skip(self))]
    async fn set_type_and_context(
        &self,
        source_id: i64,
        name: &str,
        source_type: SourceType,
        endpoint_id: i64,
    ) -> DbResult<()> {
        let matched = SourceRecord::update_context(
            self.pool.inner(),
            source_id,
            name,
            source_type,
            endpoint_id,
        )
        .await?;
        require_row(source_id, matched)
    }

    #[instrument(skip(self, authentication))]
    async fn set_authentication(
        &self,
        source_id: i64,
        authentication: &serde_json::Value,
    ) -> DbResult<()> {
        let matched =
            SourceRecord::update_authentication(self.pool.inner(), source_id, authentication)
                .await?;
        require_row(source_id, matched)
    }

    #[instrument(skip(self, billing_source))]
    async fn set_billing_source(
        &self,
        source_id: i64,
        billing_source: &serde_json::Value,
    ) -> DbResult<()> {
        let matched =
            SourceRecord::update_billing_source(self.pool.inner(), source_id, billing_source)
                .await?;
        require_row(source_id, matched)
    }

    #[instrument(skip(self))]
    async fn set_provider_uuid(&self, source_id: i64, provider_uuid: Uuid) -> DbResult<()> {
        let matched =
            SourceRecord::update_provider_uuid(self.pool.inner(), source_id, provider_uuid)
                .await?;
        require_row(source_id, matched)
    }

    #[instrument(skip(self))]
    async fn clear_update_flag(&self, source_id: i64) -> DbResult<()> {
        Ok(SourceRecord::clear_update(self.pool.inner(), source_id).await?)
    }

    #[instrument(skip(self))]
    async fn remove(&self, source_id: i64) -> DbResult<bool> {
        Ok(SourceRecord::delete(self.pool.inner(), source_id).await?)
    }

    async fn get(&self, source_id: i64) -> DbResult<Option<SourceRecord>> {
        Ok(SourceRecord::find_by_source_id(self.pool.inner(), source_id).await?)
    }

    async fn load_pending(&self) -> DbResult<Vec<SourceRecord>> {
        Ok(SourceRecord::list_pending(self.pool.inner()).await?)
    }

    async fn lookup_source_type(&self, source_id: i64) -> DbResult<Option<SourceType>> {
        Ok(SourceRecord::find_source_type(self.pool.inner(), source_id).await?)
    }

    async fn lookup_source_for_endpoint(&self, endpoint_id: i64) -> DbResult<Option<i64>> {
        Ok(SourceRecord::find_source_id_by_endpoint(self.pool.inner(), endpoint_id).await?)
    }
}

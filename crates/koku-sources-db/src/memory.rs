//! In-memory [`SourceStore`].
//!
//! Mirrors the semantics of [`PgSourceStore`](crate::PgSourceStore) over a
//! `BTreeMap`, so records iterate in `source_id` order. Used by the sync
//! engine tests and for dry runs without a database.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::models::{SourceRecord, SourceType};
use crate::store::SourceStore;

/// Source store held in process memory.
#[derive(Debug, Default)]
pub struct MemorySourceStore {
    records: RwLock<BTreeMap<i64, SourceRecord>>,
}

impl MemorySourceStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with records.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = SourceRecord>) -> Self {
        let records = records.into_iter().map(|r| (r.source_id, r)).collect();
        Self {
            records: RwLock::new(records),
        }
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn modify<F>(&self, source_id: i64, f: F) -> DbResult<()>
    where
        F: FnOnce(&mut SourceRecord) + Send,
    {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&source_id)
            .ok_or(DbError::NotFound(source_id))?;
        f(record);
        record.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl SourceStore for MemorySourceStore {
    async fn upsert_pending_create(
        &self,
        source_id: i64,
        auth_header: Option<&str>,
        offset: i64,
    ) -> DbResult<bool> {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&source_id) {
            record.offset = record.offset.max(offset);
            return Ok(false);
        }
        records.insert(
            source_id,
            SourceRecord::new_pending(source_id, auth_header.map(str::to_string), offset),
        );
        Ok(true)
    }

    async fn mark_pending_update(&self, source_id: i64, offset: i64) -> DbResult<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(&source_id) {
            Some(record) if record.is_provisioned() => {
                record.pending_update = true;
                record.offset = record.offset.max(offset);
                record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_pending_delete(&self, source_id: i64, offset: i64) -> DbResult<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(&source_id) {
            Some(record) => {
                record.pending_delete = true;
                record.offset = record.offset.max(offset);
                record.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_type_and_context(
        &self,
        source_id: i64,
        name: &str,
        source_type: SourceType,
        endpoint_id: i64,
    ) -> DbResult<()> {
        self.modify(source_id, |record| {
            record.name = Some(name.to_string());
            record.source_type = source_type;
            record.endpoint_id = Some(endpoint_id);
        })
        .await
    }

    async fn set_authentication(
        &self,
        source_id: i64,
        authentication: &serde_json::Value,
    ) -> DbResult<()> {
        let authentication = authentication.clone();
        self.modify(source_id, move |record| {
            record.authentication = Some(authentication);
        })
        .await
    }

    async fn set_billing_source(
        &self,
        source_id: i64,
        billing_source: &serde_json::Value,
    ) -> DbResult<()> {
        let billing_source = billing_source.clone();
        self.modify(source_id, move |record| {
            record.billing_source = Some(billing_source);
        })
        .await
    }

    async fn set_provider_uuid(&self, source_id: i64, provider_uuid: Uuid) -> DbResult<()> {
        self.modify(source_id, |record| {
            record.provider_uuid = Some(provider_uuid);
            record.pending_create = false;
        })
        .await
    }

    async fn clear_update_flag(&self, source_id: i64) -> DbResult<()> {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&source_id) {
            if record.pending_update {
                record.pending_update = false;
                record.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn remove(&self, source_id: i64) -> DbResult<bool> {
        Ok(self.records.write().await.remove(&source_id).is_some())
    }

    async fn get(&self, source_id: i64) -> DbResult<Option<SourceRecord>> {
        Ok(self.records.read().await.get(&source_id).cloned())
    }

    async fn load_pending(&self) -> DbResult<Vec<SourceRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.has_pending())
            .cloned()
            .collect())
    }

    async fn lookup_source_type(&self, source_id: i64) -> DbResult<Option<SourceType>> {
        Ok(self
            .records
            .read()
            .await
            .get(&source_id)
            .map(|r| r.source_type))
    }

    async fn lookup_source_for_endpoint(&self, endpoint_id: i64) -> DbResult<Option<i64>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.endpoint_id == Some(endpoint_id))
            .map(|r| r.source_id))
    }
}

//! Provider operations against the provider-management API.
//!
//! Per record the operations move through
//! `NEW -> CREATING -> PROVISIONED -> UPDATING -> PROVISIONED` and
//! `* -> DESTROYING -> REMOVED`. The record is re-read before every
//! operation; the task itself carries no state.
//!
//! A provider created upstream whose UUID could not be stored is held in
//! memory until the store write succeeds. Retries write the held UUID
//! instead of creating the provider again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use koku_sources_client::{ProviderApi, ProviderRequest};
use koku_sources_db::{SourceRecord, SourceStore};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::operation::{Operation, SyncTask};

/// Result of a task that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The provider call succeeded and the store reflects it.
    Completed,
    /// Nothing to do for the record's current state.
    Skipped(SkipReason),
}

/// Why a task was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The record was removed after the task was queued.
    RecordGone,
    /// The record is waiting to be destroyed.
    PendingDelete,
    /// A create for a record that already has a provider.
    AlreadyProvisioned,
    /// An update for a record that has no provider yet.
    NotProvisioned,
    /// Enrichment has not gathered everything a create needs.
    NotReady,
}

/// Runs execution tasks.
pub struct Executor {
    store: Arc<dyn SourceStore>,
    providers: Arc<dyn ProviderApi>,
    fake_auth_header: String,
    unsaved: Mutex<HashMap<i64, Uuid>>,
}

impl Executor {
    pub fn new(
        store: Arc<dyn SourceStore>,
        providers: Arc<dyn ProviderApi>,
        fake_auth_header: impl Into<String>,
    ) -> Self {
        Self {
            store,
            providers,
            fake_auth_header: fake_auth_header.into(),
            unsaved: Mutex::new(HashMap::new()),
        }
    }

    /// Provider UUID created for `source_id` but not yet stored.
    #[must_use]
    pub fn unsaved_provider(&self, source_id: i64) -> Option<Uuid> {
        self.unsaved().get(&source_id).copied()
    }

    fn unsaved(&self) -> MutexGuard<'_, HashMap<i64, Uuid>> {
        self.unsaved.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Perform one task against the record's current state.
    #[instrument(skip(self), fields(source_id = task.source_id, operation = %task.operation))]
    pub async fn execute(&self, task: SyncTask) -> SyncResult<ExecutionOutcome> {
        let Some(record) = self.store.get(task.source_id).await? else {
            return Ok(ExecutionOutcome::Skipped(SkipReason::RecordGone));
        };

        match task.operation {
            Operation::Destroy => self.destroy(&record).await,
            Operation::Create => self.create(&record).await,
            Operation::Update => self.update(&record).await,
        }
    }

    fn auth_header<'a>(&'a self, record: &'a SourceRecord) -> &'a str {
        record
            .auth_header
            .as_deref()
            .unwrap_or(&self.fake_auth_header)
    }

    async fn create(&self, record: &SourceRecord) -> SyncResult<ExecutionOutcome> {
        if record.pending_delete {
            return Ok(ExecutionOutcome::Skipped(SkipReason::PendingDelete));
        }
        if record.is_provisioned() {
            self.unsaved().remove(&record.source_id);
            return Ok(ExecutionOutcome::Skipped(SkipReason::AlreadyProvisioned));
        }

        let provider_uuid = match self.unsaved_provider(record.source_id) {
            Some(provider_uuid) => {
                info!(source_id = record.source_id, %provider_uuid, "Storing previously created provider");
                provider_uuid
            }
            None => {
                if !record.is_ready_for_create() {
                    return Ok(ExecutionOutcome::Skipped(SkipReason::NotReady));
                }
                info!(source_id = record.source_id, "Creating provider");
                let request = provider_request(record)?;
                self.providers
                    .create_provider(&request, self.auth_header(record))
                    .await?
            }
        };

        if let Err(e) = self
            .store
            .set_provider_uuid(record.source_id, provider_uuid)
            .await
        {
            warn!(source_id = record.source_id, %provider_uuid, error = %e, "Provider created but not stored");
            self.unsaved().insert(record.source_id, provider_uuid);
            return Err(e.into());
        }
        self.unsaved().remove(&record.source_id);

        info!(source_id = record.source_id, %provider_uuid, "Provider assigned to source");
        Ok(ExecutionOutcome::Completed)
    }

    async fn update(&self, record: &SourceRecord) -> SyncResult<ExecutionOutcome> {
        if record.pending_delete {
            return Ok(ExecutionOutcome::Skipped(SkipReason::PendingDelete));
        }
        let Some(provider_uuid) = record.provider_uuid else {
            return Ok(ExecutionOutcome::Skipped(SkipReason::NotProvisioned));
        };

        let request = provider_request(record)?;
        self.providers
            .update_provider(provider_uuid, &request, self.auth_header(record))
            .await?;
        self.store.clear_update_flag(record.source_id).await?;

        info!(source_id = record.source_id, %provider_uuid, "Provider updated");
        Ok(ExecutionOutcome::Completed)
    }

    async fn destroy(&self, record: &SourceRecord) -> SyncResult<ExecutionOutcome> {
        let provider_uuid = record
            .provider_uuid
            .or_else(|| self.unsaved_provider(record.source_id));
        if let Some(provider_uuid) = provider_uuid {
            match self
                .providers
                .destroy_provider(provider_uuid, self.auth_header(record))
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    info!(source_id = record.source_id, %provider_uuid, "Provider already removed");
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.unsaved().remove(&record.source_id);
        self.store.remove(record.source_id).await?;
        info!(source_id = record.source_id, "Source removed");
        Ok(ExecutionOutcome::Completed)
    }
}

/// Provider create/update body for a record.
pub fn provider_request(record: &SourceRecord) -> SyncResult<ProviderRequest> {
    let missing = |field| SyncError::IncompleteRecord {
        source_id: record.source_id,
        source_type: record.source_type,
        field,
    };

    Ok(ProviderRequest {
        name: record.name.clone().ok_or_else(|| missing("name"))?,
        provider_type: record.source_type.as_str().to_string(),
        authentication: record
            .authentication
            .clone()
            .ok_or_else(|| missing("authentication"))?,
        billing_source: record.billing_source.clone(),
    })
}

//! Enrichment of classified events.
//!
//! An event is first admitted: the pending flag it implies is written to
//! the store before the broker offset is committed, so the loader can
//! recover it after a restart. Admitted events that need registry data are
//! then enriched: resolved to a source, the source registry is queried for
//! whatever the event makes stale, and the results are persisted. The
//! caller receives the execution tasks the updated record calls for.

use std::sync::Arc;

use koku_sources_client::{Application, SourceDetails, SourcesApi};
use koku_sources_db::{SourceStore, SourceType};
use koku_sources_events::{ClassifiedEvent, EventSubject, EventType};
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument};

use crate::error::{SyncError, SyncResult};
use crate::operation::{Operation, SyncTask};

/// Where an admitted event goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Fetch context from the source registry.
    Enrich,
    /// Run the task directly; no registry data is needed.
    Execute(SyncTask),
    /// Nothing to do.
    Ignore,
}

/// Applies classified events to the source record store.
pub struct Enricher {
    store: Arc<dyn SourceStore>,
    sources: Arc<dyn SourcesApi>,
    fake_auth_header: String,
}

impl Enricher {
    pub fn new(
        store: Arc<dyn SourceStore>,
        sources: Arc<dyn SourcesApi>,
        fake_auth_header: impl Into<String>,
    ) -> Self {
        Self {
            store,
            sources,
            fake_auth_header: fake_auth_header.into(),
        }
    }

    /// Store the pending flag an event implies and decide how it proceeds.
    ///
    /// Makes no registry calls. Only an application create brings a new
    /// source under management; updates for unknown sources are ignored.
    #[instrument(skip_all, fields(event_type = %event.event_type, subject = ?event.subject))]
    pub async fn admit(&self, event: &ClassifiedEvent) -> SyncResult<Admission> {
        let offset = event.offset;

        match (event.event_type, event.subject) {
            (event_type, EventSubject::Source(id)) if event_type.is_destroy() => {
                if self.store.mark_pending_delete(id, offset).await? {
                    Ok(Admission::Execute(SyncTask::new(id, Operation::Destroy)))
                } else {
                    info!(source_id = id, "Destroy for unknown source ignored");
                    Ok(Admission::Ignore)
                }
            }
            (EventType::ApplicationCreate, EventSubject::Source(id)) => {
                let created = self
                    .store
                    .upsert_pending_create(id, event.auth_header.as_deref(), offset)
                    .await?;
                debug!(source_id = id, created, "Pending create stored");
                Ok(Admission::Enrich)
            }
            (EventType::SourceUpdate, EventSubject::Source(id)) => {
                if self.store.get(id).await?.is_none() {
                    debug!(source_id = id, "Update for unmanaged source ignored");
                    return Ok(Admission::Ignore);
                }
                self.store.mark_pending_update(id, offset).await?;
                Ok(Admission::Enrich)
            }
            (EventType::AuthenticationUpdate, EventSubject::Endpoint(endpoint_id)) => {
                let Some(id) = self.store.lookup_source_for_endpoint(endpoint_id).await? else {
                    info!(endpoint_id, "Authentication for unknown endpoint ignored");
                    return Ok(Admission::Ignore);
                };
                self.store.mark_pending_update(id, offset).await?;
                Ok(Admission::Enrich)
            }
            (EventType::AuthenticationCreate, EventSubject::Endpoint(_)) => Ok(Admission::Enrich),
            (event_type, subject) => {
                debug!(%event_type, ?subject, "Event subject does not match event type");
                Ok(Admission::Ignore)
            }
        }
    }

    /// Process one admitted event and return the tasks to enqueue.
    ///
    /// Destroy events touch only the store. Any registry failure aborts the
    /// event; whatever was persisted before the failure stays.
    #[instrument(skip_all, fields(event_type = %event.event_type, subject = ?event.subject))]
    pub async fn process(&self, event: &ClassifiedEvent) -> SyncResult<Vec<SyncTask>> {
        let auth_header = event
            .auth_header
            .as_deref()
            .unwrap_or(&self.fake_auth_header);

        match (event.event_type, event.subject) {
            (event_type, EventSubject::Source(id)) if event_type.is_destroy() => {
                if self.store.mark_pending_delete(id, event.offset).await? {
                    Ok(vec![SyncTask::new(id, Operation::Destroy)])
                } else {
                    info!(source_id = id, "Destroy for unknown source ignored");
                    Ok(Vec::new())
                }
            }
            (EventType::ApplicationCreate | EventType::SourceUpdate, EventSubject::Source(id)) => {
                match self.store.get(id).await? {
                    None => {
                        info!(source_id = id, "Source removed before enrichment");
                        return Ok(Vec::new());
                    }
                    Some(record) if record.pending_delete => {
                        debug!(source_id = id, "Source is being deleted; enrichment skipped");
                        return Ok(Vec::new());
                    }
                    Some(_) => {}
                }
                self.enrich_source(id, auth_header).await?;
                if event.event_type == EventType::SourceUpdate {
                    self.store.mark_pending_update(id, event.offset).await?;
                }
                self.emit(id).await
            }
            (
                EventType::AuthenticationCreate | EventType::AuthenticationUpdate,
                EventSubject::Endpoint(endpoint_id),
            ) => {
                let Some(id) = self.store.lookup_source_for_endpoint(endpoint_id).await? else {
                    info!(endpoint_id, "Authentication for unknown endpoint ignored");
                    return Ok(Vec::new());
                };
                if !self.save_credentials(id, auth_header).await? {
                    return Ok(Vec::new());
                }
                if event.event_type == EventType::AuthenticationUpdate {
                    self.store.mark_pending_update(id, event.offset).await?;
                }
                self.emit(id).await
            }
            (event_type, subject) => {
                debug!(%event_type, ?subject, "Event subject does not match event type");
                Ok(Vec::new())
            }
        }
    }

    /// Fetch name, type and endpoint, then credentials.
    async fn enrich_source(&self, source_id: i64, auth_header: &str) -> SyncResult<()> {
        let details = self.sources.source_details(source_id, auth_header).await?;
        let type_name = self
            .sources
            .source_type_name(details.source_type_id, auth_header)
            .await?;
        let source_type = SourceType::from_registry_name(&type_name).ok_or_else(|| {
            SyncError::UnsupportedSourceType {
                source_id,
                type_name: type_name.clone(),
            }
        })?;
        let endpoint_id = self.sources.endpoint_id(source_id, auth_header).await?;

        self.store
            .set_type_and_context(source_id, &details.name, source_type, endpoint_id)
            .await?;
        debug!(source_id, %source_type, endpoint_id, "Stored source context");

        self.store_credentials(source_id, source_type, endpoint_id, Some(&details), auth_header)
            .await
    }

    /// Refresh credentials of a known source. Returns false if the source is
    /// not yet typed and there is nothing to refresh.
    async fn save_credentials(&self, source_id: i64, auth_header: &str) -> SyncResult<bool> {
        let Some(record) = self.store.get(source_id).await? else {
            return Ok(false);
        };
        let Some(endpoint_id) = record.endpoint_id.filter(|_| record.source_type.is_known()) else {
            info!(source_id, "Source type not resolved yet; credentials deferred");
            return Ok(false);
        };

        self.store_credentials(source_id, record.source_type, endpoint_id, None, auth_header)
            .await?;
        Ok(true)
    }

    async fn store_credentials(
        &self,
        source_id: i64,
        source_type: SourceType,
        endpoint_id: i64,
        details: Option<&SourceDetails>,
        auth_header: &str,
    ) -> SyncResult<()> {
        let authentication = match source_type {
            SourceType::Ocp => {
                let uid = match details {
                    Some(details) => details.uid.clone(),
                    None => self.sources.source_details(source_id, auth_header).await?.uid,
                };
                let uid = uid.ok_or(SyncError::IncompleteRecord {
                    source_id,
                    source_type,
                    field: "cluster uid",
                })?;
                json!({ "resource_name": uid })
            }
            SourceType::Aws => {
                let arn = self.sources.aws_role_arn(endpoint_id, auth_header).await?;
                json!({ "resource_name": arn })
            }
            SourceType::Azure => {
                let creds = self
                    .sources
                    .azure_credentials(endpoint_id, auth_header)
                    .await?;
                let application = self.sources.application(source_id, auth_header).await?;

                let mut credentials = Map::new();
                credentials.insert("client_id".to_string(), creds.client_id.into());
                credentials.insert("client_secret".to_string(), creds.client_secret.into());
                credentials.insert("tenant_id".to_string(), creds.tenant_id.into());

                if let Some(application) = &application {
                    if let Some(subscription_id) = application.extra.get("subscription_id") {
                        credentials.insert("subscription_id".to_string(), subscription_id.clone());
                    }
                    if let Some(billing_source) = azure_billing_source(application) {
                        self.store
                            .set_billing_source(source_id, &billing_source)
                            .await?;
                    }
                }
                json!({ "credentials": Value::Object(credentials) })
            }
            SourceType::Unknown => {
                return Err(SyncError::IncompleteRecord {
                    source_id,
                    source_type,
                    field: "source type",
                })
            }
        };

        self.store
            .set_authentication(source_id, &authentication)
            .await?;
        info!(source_id, %source_type, "Stored authentication");
        Ok(())
    }

    /// Task the record's current state calls for.
    async fn emit(&self, source_id: i64) -> SyncResult<Vec<SyncTask>> {
        let Some(record) = self.store.get(source_id).await? else {
            return Ok(Vec::new());
        };

        Ok(match SyncTask::for_record(&record) {
            Some(task) if task.operation == Operation::Create && !record.is_ready_for_create() => {
                debug!(source_id, "Source not ready for create");
                Vec::new()
            }
            Some(task) => vec![task],
            None => Vec::new(),
        })
    }
}

/// Billing location from the application's settings, if complete.
fn azure_billing_source(application: &Application) -> Option<Value> {
    let resource_group = application.extra.get("resource_group")?.as_str()?;
    let storage_account = application.extra.get("storage_account")?.as_str()?;
    Some(json!({
        "data_source": {
            "resource_group": resource_group,
            "storage_account": storage_account,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_azure_billing_source_requires_both_fields() {
        let full = Application {
            id: 1,
            extra: json!({"resource_group": "rg", "storage_account": "sa", "subscription_id": "s"}),
        };
        assert_eq!(
            azure_billing_source(&full),
            Some(json!({"data_source": {"resource_group": "rg", "storage_account": "sa"}}))
        );

        let partial = Application {
            id: 1,
            extra: json!({"resource_group": "rg"}),
        };
        assert_eq!(azure_billing_source(&partial), None);
        assert_eq!(
            azure_billing_source(&Application {
                id: 1,
                extra: Value::Null
            }),
            None
        );
    }
}

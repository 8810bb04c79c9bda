//! Enrichment of classified events against a fake source registry.

mod common;

use std::sync::Arc;

use common::{event, unavailable, FakeSource, FakeSources};
use koku_sources_db::{MemorySourceStore, SourceStore, SourceType};
use koku_sources_events::{ClassifiedEvent, EventSubject, EventType};
use koku_sources_sync::{
    Admission, Enricher, Operation, SyncError, SyncResult, SyncTask, DEFAULT_FAKE_HEADER,
};
use serde_json::json;
use uuid::Uuid;

const ARN: &str = "arn:aws:iam::1:role/x";

fn setup() -> (Enricher, Arc<MemorySourceStore>, Arc<FakeSources>) {
    let store = Arc::new(MemorySourceStore::new());
    let sources = FakeSources::new();
    let enricher = Enricher::new(store.clone(), sources.clone(), DEFAULT_FAKE_HEADER);
    (enricher, store, sources)
}

/// Admit and enrich an event the way the engine does.
async fn run(enricher: &Enricher, event: &ClassifiedEvent) -> SyncResult<Vec<SyncTask>> {
    match enricher.admit(event).await? {
        Admission::Enrich => enricher.process(event).await,
        Admission::Execute(task) => Ok(vec![task]),
        Admission::Ignore => Ok(Vec::new()),
    }
}

#[tokio::test]
async fn test_application_create_enriches_aws_source() {
    let (enricher, store, sources) = setup();
    sources.put(42, FakeSource::aws("my-aws", 11, ARN));

    let tasks = run(
        &enricher,
        &event(EventType::ApplicationCreate, EventSubject::Source(42), 7),
    )
    .await
    .unwrap();

    assert_eq!(tasks, vec![SyncTask::new(42, Operation::Create)]);
    let record = store.get(42).await.unwrap().unwrap();
    assert_eq!(record.name.as_deref(), Some("my-aws"));
    assert_eq!(record.source_type, SourceType::Aws);
    assert_eq!(record.endpoint_id, Some(11));
    assert_eq!(record.authentication, Some(json!({"resource_name": ARN})));
    assert_eq!(record.offset, 7);
    assert!(record.pending_create);
}

#[tokio::test]
async fn test_application_create_enriches_openshift_source() {
    let (enricher, store, sources) = setup();
    sources.put(5, FakeSource::ocp("cluster", 50, "0b0c6c3a-uid"));

    let tasks = run(
        &enricher,
        &event(EventType::ApplicationCreate, EventSubject::Source(5), 1),
    )
    .await
    .unwrap();

    assert_eq!(tasks, vec![SyncTask::new(5, Operation::Create)]);
    let record = store.get(5).await.unwrap().unwrap();
    assert_eq!(record.source_type, SourceType::Ocp);
    assert_eq!(
        record.authentication,
        Some(json!({"resource_name": "0b0c6c3a-uid"}))
    );
}

#[tokio::test]
async fn test_azure_source_gets_credentials_and_billing_source() {
    let (enricher, store, sources) = setup();
    sources.put(
        8,
        FakeSource::azure(
            "azure-sub",
            80,
            json!({"resource_group": "rg", "storage_account": "sa", "subscription_id": "sub"}),
        ),
    );

    let tasks = run(
        &enricher,
        &event(EventType::ApplicationCreate, EventSubject::Source(8), 3),
    )
    .await
    .unwrap();

    assert_eq!(tasks, vec![SyncTask::new(8, Operation::Create)]);
    let record = store.get(8).await.unwrap().unwrap();
    assert_eq!(
        record.authentication,
        Some(json!({"credentials": {
            "client_id": "client",
            "client_secret": "secret",
            "tenant_id": "tenant",
            "subscription_id": "sub"
        }}))
    );
    assert_eq!(
        record.billing_source,
        Some(json!({"data_source": {"resource_group": "rg", "storage_account": "sa"}}))
    );
}

#[tokio::test]
async fn test_azure_source_without_billing_location_waits() {
    let (enricher, store, sources) = setup();
    sources.put(9, FakeSource::azure("azure-sub", 90, json!({})));

    let tasks = run(
        &enricher,
        &event(EventType::ApplicationCreate, EventSubject::Source(9), 3),
    )
    .await
    .unwrap();

    assert!(tasks.is_empty());
    let record = store.get(9).await.unwrap().unwrap();
    assert!(record.authentication.is_some());
    assert!(record.billing_source.is_none());
    assert!(record.pending_create);
}

#[tokio::test]
async fn test_unsupported_source_type_keeps_partial_record() {
    let (enricher, store, sources) = setup();
    sources.put(
        3,
        FakeSource {
            name: "gcp".to_string(),
            type_name: "google".to_string(),
            endpoint_id: Some(30),
            ..FakeSource::default()
        },
    );

    let err = run(
        &enricher,
        &event(EventType::ApplicationCreate, EventSubject::Source(3), 1),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SyncError::UnsupportedSourceType { source_id: 3, .. }));
    assert!(!err.is_recoverable());
    let record = store.get(3).await.unwrap().unwrap();
    assert!(record.pending_create);
    assert_eq!(record.source_type, SourceType::Unknown);
}

#[tokio::test]
async fn test_registry_outage_is_recoverable() {
    let (enricher, store, sources) = setup();
    sources.put(42, FakeSource::aws("my-aws", 11, ARN));
    sources.fail_next(unavailable());

    let err = run(
        &enricher,
        &event(EventType::ApplicationCreate, EventSubject::Source(42), 1),
    )
    .await
    .unwrap_err();

    assert!(err.is_recoverable());
    assert!(store.get(42).await.unwrap().unwrap().pending_create);
}

#[tokio::test]
async fn test_destroy_of_unknown_source_is_ignored() {
    let (enricher, store, sources) = setup();

    let admission = enricher
        .admit(&event(EventType::SourceDestroy, EventSubject::Source(77), 1))
        .await
        .unwrap();

    assert_eq!(admission, Admission::Ignore);
    assert!(store.is_empty().await);
    assert_eq!(sources.calls(), 0);
}

#[tokio::test]
async fn test_destroy_flags_known_source_without_registry_calls() {
    let (enricher, store, sources) = setup();
    store.upsert_pending_create(12, None, 0).await.unwrap();

    let admission = enricher
        .admit(&event(EventType::ApplicationDestroy, EventSubject::Source(12), 2))
        .await
        .unwrap();

    assert_eq!(
        admission,
        Admission::Execute(SyncTask::new(12, Operation::Destroy))
    );
    let record = store.get(12).await.unwrap().unwrap();
    assert!(record.pending_delete);
    assert_eq!(record.offset, 2);
    assert_eq!(sources.calls(), 0);
}

#[tokio::test]
async fn test_authentication_for_unknown_endpoint_is_ignored() {
    let (enricher, store, _sources) = setup();

    let tasks = enricher
        .process(&event(EventType::AuthenticationCreate, EventSubject::Endpoint(404), 1))
        .await
        .unwrap();

    assert!(tasks.is_empty());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_authentication_update_refreshes_provisioned_source() {
    let (enricher, store, sources) = setup();
    sources.put(42, FakeSource::aws("my-aws", 11, ARN));
    run(
        &enricher,
        &event(EventType::ApplicationCreate, EventSubject::Source(42), 1),
    )
    .await
    .unwrap();
    store.set_provider_uuid(42, Uuid::new_v4()).await.unwrap();

    sources.update(42, |s| s.role_arn = Some("arn:aws:iam::1:role/y".to_string()));
    let tasks = run(
        &enricher,
        &event(EventType::AuthenticationUpdate, EventSubject::Endpoint(11), 2),
    )
    .await
    .unwrap();

    assert_eq!(tasks, vec![SyncTask::new(42, Operation::Update)]);
    let record = store.get(42).await.unwrap().unwrap();
    assert!(record.pending_update);
    assert_eq!(record.offset, 2);
    assert_eq!(
        record.authentication,
        Some(json!({"resource_name": "arn:aws:iam::1:role/y"}))
    );
}

#[tokio::test]
async fn test_authentication_create_before_type_is_known_is_deferred() {
    let (enricher, store, sources) = setup();
    store.upsert_pending_create(42, None, 0).await.unwrap();
    store
        .set_type_and_context(42, "my-aws", SourceType::Unknown, 11)
        .await
        .unwrap();

    let tasks = enricher
        .process(&event(EventType::AuthenticationCreate, EventSubject::Endpoint(11), 2))
        .await
        .unwrap();

    assert!(tasks.is_empty());
    assert_eq!(sources.calls(), 0);
}

#[tokio::test]
async fn test_source_update_of_provisioned_source_emits_update() {
    let (enricher, store, sources) = setup();
    sources.put(42, FakeSource::aws("my-aws", 11, ARN));
    run(
        &enricher,
        &event(EventType::ApplicationCreate, EventSubject::Source(42), 1),
    )
    .await
    .unwrap();
    store.set_provider_uuid(42, Uuid::new_v4()).await.unwrap();

    sources.update(42, |s| s.name = "renamed".to_string());
    let tasks = run(
        &enricher,
        &event(EventType::SourceUpdate, EventSubject::Source(42), 5),
    )
    .await
    .unwrap();

    assert_eq!(tasks, vec![SyncTask::new(42, Operation::Update)]);
    assert_eq!(
        store.get(42).await.unwrap().unwrap().name.as_deref(),
        Some("renamed")
    );
}

#[tokio::test]
async fn test_source_update_of_unknown_source_is_ignored() {
    let (enricher, store, sources) = setup();
    sources.put(99, FakeSource::aws("not-cost-managed", 990, ARN));
    let update = event(EventType::SourceUpdate, EventSubject::Source(99), 4);

    assert_eq!(enricher.admit(&update).await.unwrap(), Admission::Ignore);
    assert!(enricher.process(&update).await.unwrap().is_empty());

    assert!(store.is_empty().await);
    assert_eq!(sources.calls(), 0);
}

#[tokio::test]
async fn test_source_update_of_unprovisioned_source_refreshes_context() {
    let (enricher, store, sources) = setup();
    sources.put(43, FakeSource::aws("my-aws", 12, ARN));
    store.upsert_pending_create(43, None, 1).await.unwrap();

    let tasks = run(
        &enricher,
        &event(EventType::SourceUpdate, EventSubject::Source(43), 6),
    )
    .await
    .unwrap();

    assert_eq!(tasks, vec![SyncTask::new(43, Operation::Create)]);
    let record = store.get(43).await.unwrap().unwrap();
    assert!(record.pending_create);
    assert!(!record.pending_update);
    assert_eq!(record.source_type, SourceType::Aws);
}

#[tokio::test]
async fn test_enrichment_after_removal_does_not_recreate_record() {
    let (enricher, store, sources) = setup();
    sources.put(44, FakeSource::aws("my-aws", 13, ARN));
    let create = event(EventType::ApplicationCreate, EventSubject::Source(44), 1);

    assert_eq!(enricher.admit(&create).await.unwrap(), Admission::Enrich);
    store.remove(44).await.unwrap();

    assert!(enricher.process(&create).await.unwrap().is_empty());
    assert!(store.get(44).await.unwrap().is_none());
    assert_eq!(sources.calls(), 0);
}

#[tokio::test]
async fn test_missing_endpoint_is_permanent() {
    let (enricher, _store, sources) = setup();
    sources.put(
        6,
        FakeSource {
            endpoint_id: None,
            ..FakeSource::aws("no-endpoint", 0, ARN)
        },
    );

    let err = run(
        &enricher,
        &event(EventType::ApplicationCreate, EventSubject::Source(6), 1),
    )
    .await
    .unwrap_err();
    assert!(matches!(&err, SyncError::Client(e) if e.is_not_found()));
    assert!(!err.is_recoverable());
}

//! In-process fakes for the source registry and provider-management API.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use koku_sources_client::{
    Application, AvailabilityStatus, AzureCredentials, ClientError, ClientResult, ProviderApi,
    ProviderRequest, SourceDetails, SourcesApi,
};
use koku_sources_db::MemorySourceStore;
use koku_sources_events::{ClassifiedEvent, EventSubject, EventType};
use koku_sources_sync::{EngineWorkers, SyncConfig, SyncEngine};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const IDENTITY: &str = "eyJpZGVudGl0eSI6IHsiYWNjb3VudF9udW1iZXIiOiAiNDIifX0=";

const SOURCE_TYPES: [(i64, &str); 4] = [(1, "amazon"), (2, "azure"), (3, "openshift"), (4, "google")];

fn type_id(name: &str) -> i64 {
    SOURCE_TYPES
        .iter()
        .find(|(_, n)| *n == name)
        .map_or(99, |(id, _)| *id)
}

pub fn unavailable() -> ClientError {
    ClientError::Status {
        url: "http://fake".to_string(),
        status: 503,
        body: String::new(),
    }
}

pub fn rejected(body: &str) -> ClientError {
    ClientError::Status {
        url: "http://fake".to_string(),
        status: 400,
        body: body.to_string(),
    }
}

/// A source as the fake registry knows it.
#[derive(Debug, Clone, Default)]
pub struct FakeSource {
    pub name: String,
    pub type_name: String,
    pub endpoint_id: Option<i64>,
    pub uid: Option<String>,
    pub role_arn: Option<String>,
    pub azure: Option<AzureCredentials>,
    pub application_extra: Option<Value>,
}

impl FakeSource {
    pub fn aws(name: &str, endpoint_id: i64, arn: &str) -> Self {
        Self {
            name: name.to_string(),
            type_name: "amazon".to_string(),
            endpoint_id: Some(endpoint_id),
            role_arn: Some(arn.to_string()),
            application_extra: Some(Value::Null),
            ..Self::default()
        }
    }

    pub fn ocp(name: &str, endpoint_id: i64, uid: &str) -> Self {
        Self {
            name: name.to_string(),
            type_name: "openshift".to_string(),
            endpoint_id: Some(endpoint_id),
            uid: Some(uid.to_string()),
            application_extra: Some(Value::Null),
            ..Self::default()
        }
    }

    pub fn azure(name: &str, endpoint_id: i64, extra: Value) -> Self {
        Self {
            name: name.to_string(),
            type_name: "azure".to_string(),
            endpoint_id: Some(endpoint_id),
            azure: Some(AzureCredentials {
                client_id: "client".to_string(),
                client_secret: "secret".to_string(),
                tenant_id: "tenant".to_string(),
            }),
            application_extra: Some(extra),
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct SourcesState {
    sources: HashMap<i64, FakeSource>,
    statuses: Vec<(i64, AvailabilityStatus)>,
    calls: usize,
    failures: VecDeque<ClientError>,
}

/// Scriptable source registry.
#[derive(Default)]
pub struct FakeSources {
    state: Mutex<SourcesState>,
}

impl FakeSources {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put(&self, source_id: i64, source: FakeSource) {
        self.state.lock().unwrap().sources.insert(source_id, source);
    }

    pub fn update<F: FnOnce(&mut FakeSource)>(&self, source_id: i64, f: F) {
        let mut state = self.state.lock().unwrap();
        f(state.sources.get_mut(&source_id).unwrap());
    }

    /// Fail the next registry call with `error`.
    pub fn fail_next(&self, error: ClientError) {
        self.state.lock().unwrap().failures.push_back(error);
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    pub fn statuses(&self) -> Vec<(i64, AvailabilityStatus)> {
        self.state.lock().unwrap().statuses.clone()
    }

    fn lookup<T>(
        &self,
        what: &'static str,
        key: i64,
        f: impl FnOnce(&SourcesState) -> Option<T>,
    ) -> ClientResult<T> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }
        f(&state).ok_or_else(|| ClientError::missing(what, key))
    }

    fn source_for_endpoint(state: &SourcesState, endpoint_id: i64) -> Option<&FakeSource> {
        state
            .sources
            .values()
            .find(|s| s.endpoint_id == Some(endpoint_id))
    }
}

#[async_trait]
impl SourcesApi for FakeSources {
    async fn application_type_id(&self, _auth_header: &str) -> ClientResult<i64> {
        self.lookup("application type", 0, |_| Some(2))
    }

    async fn source_details(&self, source_id: i64, _auth_header: &str) -> ClientResult<SourceDetails> {
        self.lookup("source", source_id, |state| {
            state.sources.get(&source_id).map(|s| SourceDetails {
                name: s.name.clone(),
                source_type_id: type_id(&s.type_name),
                uid: s.uid.clone(),
            })
        })
    }

    async fn source_type_name(&self, type_id: i64, _auth_header: &str) -> ClientResult<String> {
        self.lookup("source type", type_id, |_| {
            SOURCE_TYPES
                .iter()
                .find(|(id, _)| *id == type_id)
                .map(|(_, name)| (*name).to_string())
        })
    }

    async fn endpoint_id(&self, source_id: i64, _auth_header: &str) -> ClientResult<i64> {
        self.lookup("endpoint", source_id, |state| {
            state.sources.get(&source_id).and_then(|s| s.endpoint_id)
        })
    }

    async fn aws_role_arn(&self, endpoint_id: i64, _auth_header: &str) -> ClientResult<String> {
        self.lookup("authentication", endpoint_id, |state| {
            Self::source_for_endpoint(state, endpoint_id).and_then(|s| s.role_arn.clone())
        })
    }

    async fn azure_credentials(
        &self,
        endpoint_id: i64,
        _auth_header: &str,
    ) -> ClientResult<AzureCredentials> {
        self.lookup("authentication", endpoint_id, |state| {
            Self::source_for_endpoint(state, endpoint_id).and_then(|s| s.azure.clone())
        })
    }

    async fn application(
        &self,
        source_id: i64,
        _auth_header: &str,
    ) -> ClientResult<Option<Application>> {
        self.lookup("application", source_id, |state| {
            Some(
                state
                    .sources
                    .get(&source_id)
                    .and_then(|s| s.application_extra.clone())
                    .map(|extra| Application {
                        id: source_id * 10,
                        extra,
                    }),
            )
        })
    }

    async fn set_availability_status(
        &self,
        source_id: i64,
        status: &AvailabilityStatus,
        _auth_header: &str,
    ) -> ClientResult<()> {
        self.state
            .lock()
            .unwrap()
            .statuses
            .push((source_id, status.clone()));
        Ok(())
    }
}

/// A provider-management call the fake received.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    Create(ProviderRequest),
    Update(Uuid, ProviderRequest),
    Destroy(Uuid),
}

#[derive(Default)]
struct ProvidersState {
    calls: Vec<ProviderCall>,
    failures: VecDeque<ClientError>,
    next_uuid: Option<Uuid>,
    delay: Option<Duration>,
    active: usize,
    max_active: usize,
}

/// Recording provider-management API.
#[derive(Default)]
pub struct FakeProviders {
    state: Mutex<ProvidersState>,
}

impl FakeProviders {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next provider call with `error`.
    pub fn fail_next(&self, error: ClientError) {
        self.state.lock().unwrap().failures.push_back(error);
    }

    /// UUID returned by the next create.
    pub fn assign_uuid(&self, uuid: Uuid) {
        self.state.lock().unwrap().next_uuid = Some(uuid);
    }

    /// Hold every call for `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Most calls that were ever running at once.
    pub fn max_active(&self) -> usize {
        self.state.lock().unwrap().max_active
    }

    async fn record(&self, call: ProviderCall) -> ClientResult<()> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(call);
            state.active += 1;
            state.max_active = state.max_active.max(state.active);
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        state.active -= 1;
        match state.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProviderApi for FakeProviders {
    async fn create_provider(
        &self,
        request: &ProviderRequest,
        _auth_header: &str,
    ) -> ClientResult<Uuid> {
        self.record(ProviderCall::Create(request.clone())).await?;
        let uuid = self.state.lock().unwrap().next_uuid.take();
        Ok(uuid.unwrap_or_else(Uuid::new_v4))
    }

    async fn update_provider(
        &self,
        provider_uuid: Uuid,
        request: &ProviderRequest,
        _auth_header: &str,
    ) -> ClientResult<Uuid> {
        self.record(ProviderCall::Update(provider_uuid, request.clone()))
            .await?;
        Ok(provider_uuid)
    }

    async fn destroy_provider(&self, provider_uuid: Uuid, _auth_header: &str) -> ClientResult<()> {
        self.record(ProviderCall::Destroy(provider_uuid)).await
    }
}

pub fn event(event_type: EventType, subject: EventSubject, offset: i64) -> ClassifiedEvent {
    ClassifiedEvent {
        event_type,
        subject,
        auth_header: Some(IDENTITY.to_string()),
        offset,
    }
}

/// An engine over an in-memory store and the two fakes.
pub struct TestEngine {
    pub engine: SyncEngine,
    pub store: Arc<MemorySourceStore>,
    pub sources: Arc<FakeSources>,
    pub providers: Arc<FakeProviders>,
    pub shutdown: CancellationToken,
    workers: Option<EngineWorkers>,
    handle: Option<JoinHandle<()>>,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_store(MemorySourceStore::new(), test_config())
    }

    pub fn with_store(store: MemorySourceStore, config: SyncConfig) -> Self {
        init_test_logging();
        let store = Arc::new(store);
        let sources = FakeSources::new();
        let providers = FakeProviders::new();
        let shutdown = CancellationToken::new();
        let (engine, workers) = SyncEngine::new(
            store.clone(),
            sources.clone(),
            providers.clone(),
            config,
            shutdown.clone(),
        );
        Self {
            engine,
            store,
            sources,
            providers,
            shutdown,
            workers: Some(workers),
            handle: None,
        }
    }

    /// Spawn the engine's workers.
    pub fn start(&mut self) {
        if let Some(workers) = self.workers.take() {
            self.handle = Some(tokio::spawn(workers.run()));
        }
    }

    pub async fn stop(mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("engine did not stop")
                .unwrap();
        }
    }
}

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}

pub fn test_config() -> SyncConfig {
    SyncConfig::default()
        .with_retry_delay(Duration::from_millis(50))
        .with_max_in_flight(4)
}

/// Poll `check` with a clone of `ctx` until it holds or five seconds pass.
pub async fn eventually<T, F, Fut>(what: &str, ctx: T, check: F)
where
    T: Clone,
    F: Fn(T) -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check(ctx.clone()).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

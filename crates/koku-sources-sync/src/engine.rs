//! Synchronization engine.
//!
//! Classified events are admitted first, which stores their pending flag.
//! Destroys then go straight to the execution queue; every other event
//! enters a single enrichment queue and is processed one at a time in
//! arrival order. Enrichment emits execution tasks onto the execution
//! queue, whose tasks run concurrently up to `max_in_flight`, with at
//! most one task per source at a time. A task for a busy source is deferred
//! through the retry scheduler.

use std::collections::HashSet;
use std::error::Error;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use koku_sources_client::{AvailabilityStatus, ProviderApi, SourcesApi};
use koku_sources_db::SourceStore;
use koku_sources_events::{ClassifiedEvent, EventHandler};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SyncConfig;
use crate::enrichment::{Admission, Enricher};
use crate::error::{SyncError, SyncResult};
use crate::execution::{ExecutionOutcome, Executor};
use crate::loader::PendingLoader;
use crate::operation::{Operation, SyncTask};
use crate::retry::RetryScheduler;

struct EngineInner {
    store: Arc<dyn SourceStore>,
    sources: Arc<dyn SourcesApi>,
    config: SyncConfig,
    enricher: Enricher,
    executor: Executor,
    loader: PendingLoader,
    retry: RetryScheduler,
    enrichment_tx: UnboundedSender<ClassifiedEvent>,
    execution_tx: UnboundedSender<SyncTask>,
    permits: Arc<Semaphore>,
    in_flight: Mutex<HashSet<i64>>,
    shutdown: CancellationToken,
}

/// Handle for feeding work into the engine.
///
/// Cheap to clone. The queues live until [`EngineWorkers::run`] returns.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

/// Background loops draining the engine's queues.
pub struct EngineWorkers {
    engine: SyncEngine,
    enrichment_rx: UnboundedReceiver<ClassifiedEvent>,
    execution_rx: UnboundedReceiver<SyncTask>,
}

impl SyncEngine {
    /// Build an engine and the workers that drive it.
    pub fn new(
        store: Arc<dyn SourceStore>,
        sources: Arc<dyn SourcesApi>,
        providers: Arc<dyn ProviderApi>,
        config: SyncConfig,
        shutdown: CancellationToken,
    ) -> (Self, EngineWorkers) {
        let (enrichment_tx, enrichment_rx) = mpsc::unbounded_channel();
        let (execution_tx, execution_rx) = mpsc::unbounded_channel();

        let inner = EngineInner {
            enricher: Enricher::new(
                store.clone(),
                sources.clone(),
                config.fake_auth_header.clone(),
            ),
            executor: Executor::new(store.clone(), providers, config.fake_auth_header.clone()),
            loader: PendingLoader::new(store.clone()),
            retry: RetryScheduler::new(config.retry_delay, execution_tx.clone(), shutdown.clone()),
            permits: Arc::new(Semaphore::new(config.max_in_flight)),
            in_flight: Mutex::new(HashSet::new()),
            store,
            sources,
            config,
            enrichment_tx,
            execution_tx,
            shutdown,
        };

        let engine = Self {
            inner: Arc::new(inner),
        };
        let workers = EngineWorkers {
            engine: engine.clone(),
            enrichment_rx,
            execution_rx,
        };
        (engine, workers)
    }

    /// Admit a classified event from the broker.
    ///
    /// The pending flag the event implies is stored before this returns,
    /// so committing the event's offset afterwards loses nothing: work
    /// still queued at shutdown is found again by the loader.
    pub async fn accept(&self, event: ClassifiedEvent) -> SyncResult<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SyncError::ShutDown);
        }

        match self.inner.enricher.admit(&event).await? {
            Admission::Enrich => self.submit(event),
            Admission::Execute(task) => self.enqueue(task),
            Admission::Ignore => Ok(()),
        }
    }

    /// Queue an event for enrichment without admitting it first.
    pub fn submit(&self, event: ClassifiedEvent) -> SyncResult<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SyncError::ShutDown);
        }
        self.inner
            .enrichment_tx
            .send(event)
            .map_err(|_| SyncError::ShutDown)
    }

    /// Queue an execution task.
    pub fn enqueue(&self, task: SyncTask) -> SyncResult<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SyncError::ShutDown);
        }
        self.inner
            .execution_tx
            .send(task)
            .map_err(|_| SyncError::ShutDown)
    }

    /// Queue one task per pending record, destroys first.
    ///
    /// Returns the number of tasks queued.
    pub async fn load_pending(&self) -> SyncResult<usize> {
        let tasks = self.inner.loader.load().await?;
        let count = tasks.len();
        for task in tasks {
            self.enqueue(task)?;
        }
        Ok(count)
    }

    /// Re-drive flagged records.
    ///
    /// Records still missing context go back through enrichment; the rest
    /// are queued for execution.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> SyncResult<()> {
        let plan = self.inner.loader.sweep().await?;
        for event in plan.enrich {
            self.submit(event)?;
        }
        for task in plan.tasks {
            self.enqueue(task)?;
        }
        Ok(())
    }

    /// The record store the engine writes to.
    pub fn store(&self) -> &Arc<dyn SourceStore> {
        &self.inner.store
    }

    /// Token that stops the engine when cancelled.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    /// Mark `source_id` busy. Returns false if it already was.
    fn claim(&self, source_id: i64) -> bool {
        self.in_flight().insert(source_id)
    }

    fn release(&self, source_id: i64) {
        self.in_flight().remove(&source_id);
    }

    fn in_flight(&self) -> std::sync::MutexGuard<'_, HashSet<i64>> {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn acquire_permit(&self) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            () = self.inner.shutdown.cancelled() => None,
            permit = self.inner.permits.clone().acquire_owned() => permit.ok(),
        }
    }

    async fn enrich(&self, event: ClassifiedEvent) {
        let offset = event.offset;
        let result = tokio::select! {
            () = self.inner.shutdown.cancelled() => return,
            result = self.inner.enricher.process(&event) => result,
        };

        match result {
            Ok(tasks) => {
                for task in tasks {
                    if self.enqueue(task).is_err() {
                        debug!(source_id = task.source_id, "Execution queue closed");
                    }
                }
            }
            Err(e) => {
                warn!(
                    offset,
                    event_type = %event.event_type,
                    error = %e,
                    "Enrichment failed, event dropped"
                );
            }
        }
    }

    async fn execute(&self, task: SyncTask) {
        let result = self.inner.executor.execute(task).await;
        self.release(task.source_id);

        match result {
            Ok(ExecutionOutcome::Completed) => {
                if task.operation != Operation::Destroy {
                    self.report_status(task.source_id, AvailabilityStatus::Available)
                        .await;
                }
            }
            Ok(ExecutionOutcome::Skipped(reason)) => {
                debug!(source_id = task.source_id, operation = %task.operation, ?reason, "Task skipped");
            }
            Err(e) if e.is_recoverable() => {
                warn!(
                    source_id = task.source_id,
                    operation = %task.operation,
                    error = %e,
                    retry_in_secs = self.inner.retry.delay().as_secs_f64(),
                    "Operation failed, retrying"
                );
                self.inner.retry.schedule(task);
            }
            Err(e) => {
                error!(
                    source_id = task.source_id,
                    operation = %task.operation,
                    error = %e,
                    "Operation failed permanently"
                );
                if task.operation != Operation::Destroy {
                    self.report_status(task.source_id, AvailabilityStatus::Unavailable(e.to_string()))
                        .await;
                }
            }
        }
    }

    /// Push availability to the source registry. Failures are logged only.
    async fn report_status(&self, source_id: i64, status: AvailabilityStatus) {
        let auth_header = match self.inner.store.get(source_id).await {
            Ok(Some(record)) => record.auth_header,
            Ok(None) => None,
            Err(e) => {
                debug!(source_id, error = %e, "Could not read record for status report");
                None
            }
        };
        let auth_header = auth_header.unwrap_or_else(|| self.inner.config.fake_auth_header.clone());

        if let Err(e) = self
            .inner
            .sources
            .set_availability_status(source_id, &status, &auth_header)
            .await
        {
            warn!(source_id, error = %e, "Failed to report availability status");
        }
    }
}

#[async_trait]
impl EventHandler for SyncEngine {
    async fn handle(&self, event: ClassifiedEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.accept(event).await.map_err(Into::into)
    }
}

impl EngineWorkers {
    /// Run until the shutdown token is cancelled.
    ///
    /// Queued work is discarded on shutdown; tasks already running are
    /// awaited.
    #[instrument(skip(self))]
    pub async fn run(self) {
        let Self {
            engine,
            enrichment_rx,
            execution_rx,
        } = self;

        info!(
            max_in_flight = engine.inner.config.max_in_flight,
            retry_delay_secs = engine.inner.config.retry_delay.as_secs_f64(),
            "Starting synchronization engine"
        );

        tokio::join!(
            enrichment_loop(&engine, enrichment_rx),
            execution_loop(&engine, execution_rx),
            reconcile_loop(&engine),
        );

        info!("Waiting for in-flight operations to complete...");
        let max = u32::try_from(engine.inner.config.max_in_flight).unwrap_or(u32::MAX);
        let _ = engine.inner.permits.acquire_many(max).await;
        info!("Synchronization engine stopped");
    }
}

async fn enrichment_loop(engine: &SyncEngine, mut rx: UnboundedReceiver<ClassifiedEvent>) {
    loop {
        let event = tokio::select! {
            () = engine.inner.shutdown.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let Some(_permit) = engine.acquire_permit().await else {
            break;
        };
        engine.enrich(event).await;
    }
    debug!("Enrichment loop stopped");
}

async fn execution_loop(engine: &SyncEngine, mut rx: UnboundedReceiver<SyncTask>) {
    loop {
        let task = tokio::select! {
            () = engine.inner.shutdown.cancelled() => break,
            task = rx.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };

        if !engine.claim(task.source_id) {
            debug!(source_id = task.source_id, operation = %task.operation, "Source busy, task deferred");
            engine.inner.retry.schedule(task);
            continue;
        }

        let Some(permit) = engine.acquire_permit().await else {
            engine.release(task.source_id);
            break;
        };

        let engine = engine.clone();
        tokio::spawn(async move {
            let _permit = permit;
            engine.execute(task).await;
        });
    }
    debug!("Execution loop stopped");
}

async fn reconcile_loop(engine: &SyncEngine) {
    let Some(period) = engine.inner.config.reconcile_interval else {
        return;
    };
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            () = engine.inner.shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = engine.reconcile().await {
                    error!(error = %e, "Reconciliation sweep failed");
                }
            }
        }
    }
}

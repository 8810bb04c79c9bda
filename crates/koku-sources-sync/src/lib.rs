//! # koku-sources-sync
//!
//! Synchronization engine for the koku sources integration.
//!
//! Events classified off the broker are enriched from the source registry
//! and persisted as [`SourceRecord`](koku_sources_db::SourceRecord) flags.
//! The flags become [`SyncTask`]s that create, update or destroy providers
//! in the cost management provider-management API.
//!
//! ## Example
//!
//! ```rust,ignore
//! use koku_sources_sync::{SyncConfig, SyncEngine};
//! use tokio_util::sync::CancellationToken;
//!
//! let shutdown = CancellationToken::new();
//! let (engine, workers) = SyncEngine::new(store, sources, providers, SyncConfig::default(), shutdown.clone());
//!
//! engine.load_pending().await?;
//! tokio::spawn(workers.run());
//!
//! // Feed classified events from the broker consumer.
//! engine.accept(event).await?;
//! ```

pub mod config;
pub mod engine;
pub mod enrichment;
pub mod error;
pub mod execution;
pub mod loader;
pub mod operation;
pub mod retry;

pub use config::{SyncConfig, DEFAULT_FAKE_HEADER};
pub use engine::{EngineWorkers, SyncEngine};
pub use enrichment::{Admission, Enricher};
pub use error::{SyncError, SyncResult};
pub use execution::{provider_request, ExecutionOutcome, Executor, SkipReason};
pub use loader::{PendingLoader, SweepPlan};
pub use operation::{Operation, SyncTask};
pub use retry::RetryScheduler;

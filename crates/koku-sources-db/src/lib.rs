//! # koku-sources-db
//!
//! Source record store for the koku sources integration.
//!
//! The `sources` table holds one row per external source: its registry
//! identifiers, the credential and billing payloads gathered during
//! enrichment, the provider UUID once the provider exists, and the
//! pending create/update/delete flags that drive synchronization.
//!
//! ## Example
//!
//! ```rust,ignore
//! use koku_sources_db::{run_migrations, DbPool, PgSourceStore, SourceStore};
//!
//! let pool = DbPool::connect("postgres://localhost/koku", 10).await?;
//! run_migrations(&pool).await?;
//!
//! let store = PgSourceStore::new(pool);
//! store.upsert_pending_create(42, Some(identity), offset).await?;
//! for record in store.load_pending().await? {
//!     println!("{} pending", record.source_id);
//! }
//! ```

pub mod error;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod store;

pub use error::{DbError, DbResult};
pub use memory::MemorySourceStore;
pub use migrations::run_migrations;
pub use models::{SourceRecord, SourceType};
pub use pool::DbPool;
pub use store::{PgSourceStore, SourceStore};

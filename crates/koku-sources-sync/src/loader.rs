//! Reload of pending operations from the store.

use std::sync::Arc;

use koku_sources_db::SourceStore;
use koku_sources_events::{ClassifiedEvent, EventSubject, EventType};
use tracing::info;

use crate::error::SyncResult;
use crate::operation::{Operation, SyncTask};

/// Work produced by a reconciliation sweep.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepPlan {
    /// Execution tasks, ordered like [`PendingLoader::load`].
    pub tasks: Vec<SyncTask>,
    /// Re-enrichment requests for records a create is still waiting on.
    pub enrich: Vec<ClassifiedEvent>,
}

/// Builds execution tasks for every record left in a pending state.
pub struct PendingLoader {
    store: Arc<dyn SourceStore>,
}

impl PendingLoader {
    pub fn new(store: Arc<dyn SourceStore>) -> Self {
        Self { store }
    }

    /// One task per pending record: destroys first, then updates, then creates.
    ///
    /// Within each group tasks keep the store's `source_id` order.
    pub async fn load(&self) -> SyncResult<Vec<SyncTask>> {
        let records = self.store.load_pending().await?;
        let mut tasks: Vec<SyncTask> = records.iter().filter_map(SyncTask::for_record).collect();
        tasks.sort_by_key(|task| task.operation);

        info!(count = tasks.len(), "Loaded pending source operations");
        Ok(tasks)
    }

    /// Plan a reconciliation sweep.
    ///
    /// Like [`load`](Self::load), except records whose create is blocked on
    /// missing context are sent back through enrichment instead.
    pub async fn sweep(&self) -> SyncResult<SweepPlan> {
        let mut plan = SweepPlan::default();

        for record in self.store.load_pending().await? {
            let Some(task) = SyncTask::for_record(&record) else {
                continue;
            };
            if task.operation == Operation::Create && !record.is_ready_for_create() {
                plan.enrich.push(ClassifiedEvent {
                    event_type: EventType::ApplicationCreate,
                    subject: EventSubject::Source(record.source_id),
                    auth_header: record.auth_header.clone(),
                    offset: record.offset,
                });
            } else {
                plan.tasks.push(task);
            }
        }
        plan.tasks.sort_by_key(|task| task.operation);

        info!(
            tasks = plan.tasks.len(),
            enrich = plan.enrich.len(),
            "Planned reconciliation sweep"
        );
        Ok(plan)
    }
}

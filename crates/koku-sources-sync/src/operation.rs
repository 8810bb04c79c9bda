//! Execution tasks.

use koku_sources_db::SourceRecord;

/// Provider operation to perform for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Destroy,
    Update,
    Create,
}

impl Operation {
    /// The operation a record's pending flags call for.
    ///
    /// Delete dominates update, which dominates create.
    #[must_use]
    pub fn for_record(record: &SourceRecord) -> Option<Self> {
        if record.pending_delete {
            Some(Self::Destroy)
        } else if record.pending_update {
            Some(Self::Update)
        } else if record.pending_create {
            Some(Self::Create)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Destroy => "destroy",
            Self::Update => "update",
            Self::Create => "create",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item on the execution queue.
///
/// Tasks carry only the source ID; the worker re-reads the record before
/// acting, so a stale task can never overwrite newer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyncTask {
    pub source_id: i64,
    pub operation: Operation,
}

impl SyncTask {
    #[must_use]
    pub fn new(source_id: i64, operation: Operation) -> Self {
        Self {
            source_id,
            operation,
        }
    }

    /// Task for a record's pending state, if any.
    #[must_use]
    pub fn for_record(record: &SourceRecord) -> Option<Self> {
        Operation::for_record(record).map(|op| Self::new(record.source_id, op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_dominates() {
        let mut record = SourceRecord::new_pending(1, None, 0);
        record.pending_update = true;
        record.pending_delete = true;
        assert_eq!(Operation::for_record(&record), Some(Operation::Destroy));

        record.pending_delete = false;
        assert_eq!(Operation::for_record(&record), Some(Operation::Update));

        record.pending_update = false;
        assert_eq!(Operation::for_record(&record), Some(Operation::Create));

        record.pending_create = false;
        assert_eq!(Operation::for_record(&record), None);
    }

    #[test]
    fn test_ordering_puts_destroy_first() {
        let mut ops = vec![Operation::Create, Operation::Destroy, Operation::Update];
        ops.sort();
        assert_eq!(ops, vec![Operation::Destroy, Operation::Update, Operation::Create]);
    }
}

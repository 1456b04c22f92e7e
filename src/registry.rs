//! In-memory task registry
//!
//! Pure data container for task records, owned and exclusively mutated by
//! the tracker. Mutation is copy-on-write at record granularity: a patch
//! clones the current record, applies the changes, and replaces the entry,
//! so readers always observe a fully-applied revision.
//!
//! Record invariants live here rather than in the tracker so that no call
//! path can bypass them:
//! - `server_task_id` is write-once
//! - terminal statuses are sticky against further status patches
//! - `result` never goes from set back to unset
//! - `upload_progress` is clamped to 100 and never decreases

use crate::types::{TaskId, TaskPatch, TaskRecord};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::warn;

/// Collection of task records keyed by client-generated identifier
///
/// Lock discipline: the inner `RwLock` is only ever held for the duration of
/// a clone or a patch application; no `.await` happens while it is held.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<TaskId, TaskRecord>,
    /// Insertion order, so snapshots render stably
    order: Vec<TaskId>,
}

impl TaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly created record
    pub fn insert(&self, record: TaskRecord) {
        let mut inner = self.write_lock();
        let id = record.id.clone();
        if inner.records.insert(id.clone(), record).is_some() {
            warn!(id = %id, "task id inserted twice, replacing existing record");
        } else {
            inner.order.push(id);
        }
    }

    /// Apply a partial update to a record, returning the new revision
    ///
    /// Returns `None` when the record does not exist (e.g. a late network
    /// completion racing a registry that was since replaced). Patches that
    /// would violate an invariant are partially dropped, not errors: the
    /// offending field is ignored with a warning and the rest applies.
    pub fn apply(&self, id: &TaskId, patch: TaskPatch) -> Option<TaskRecord> {
        let mut inner = self.write_lock();
        let current = inner.records.get(id)?;
        let mut next = current.clone();

        if let Some(status) = patch.status {
            if next.status.is_terminal() && status != next.status {
                warn!(
                    id = %id,
                    current = %next.status,
                    rejected = %status,
                    "status patch against a terminal record dropped"
                );
            } else {
                next.status = status;
            }
        }

        if let Some(progress) = patch.upload_progress {
            let clamped = progress.min(100);
            if clamped < next.upload_progress {
                warn!(
                    id = %id,
                    current = next.upload_progress,
                    rejected = clamped,
                    "upload progress may not decrease, patch dropped"
                );
            } else {
                next.upload_progress = clamped;
            }
        }

        if let Some(server_id) = patch.server_task_id {
            match &next.server_task_id {
                Some(existing) if *existing != server_id => {
                    warn!(
                        id = %id,
                        existing = %existing,
                        rejected = %server_id,
                        "server task id is write-once, patch dropped"
                    );
                }
                _ => next.server_task_id = Some(server_id),
            }
        }

        if let Some(result) = patch.result {
            next.result = Some(result);
        }

        if let Some(error) = patch.error {
            next.error = Some(error);
        }

        inner.records.insert(id.clone(), next.clone());
        Some(next)
    }

    /// Look up a record by id
    pub fn get(&self, id: &TaskId) -> Option<TaskRecord> {
        self.read_lock().records.get(id).cloned()
    }

    /// Snapshot of all records in insertion order
    pub fn snapshot(&self) -> Vec<TaskRecord> {
        let inner = self.read_lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id).cloned())
            .collect()
    }

    /// Snapshot of the records currently eligible for a status poll
    ///
    /// Eligible means: a server identifier is known and the status is
    /// `queued` or `processing`. Taken atomically at tick start; records
    /// becoming eligible afterwards wait for the next tick.
    pub fn poll_eligible(&self) -> Vec<TaskRecord> {
        let inner = self.read_lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id))
            .filter(|r| r.is_poll_eligible())
            .cloned()
            .collect()
    }

    /// Number of tracked records
    pub fn len(&self) -> usize {
        self.read_lock().records.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.read_lock().records.is_empty()
    }

    fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        // A poisoned lock means a panic mid-clone; the data itself is still
        // a consistent revision, so recover rather than cascade the panic.
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

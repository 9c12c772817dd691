//! Per-task mutual exclusion for read-modify-write sequences.

use crate::task::domain::TaskId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Hands out one async lock per task.
///
/// Entries nobody holds are pruned on the next acquisition, so the map stays
/// proportional to the number of tasks being mutated right now.
#[derive(Debug, Default)]
pub struct TaskLocks {
    slots: Mutex<HashMap<TaskId, Arc<AsyncMutex<()>>>>,
}

impl TaskLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `task_id`.
    pub async fn acquire(&self, task_id: &TaskId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.retain(|id, lock| id == task_id || Arc::strong_count(lock) > 1);
            Arc::clone(slots.entry(task_id.clone()).or_default())
        };
        slot.lock_owned().await
    }

    /// Returns the number of tasks with a live lock entry.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

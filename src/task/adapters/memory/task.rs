//! In-memory implementation of the task repository port.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::task::{
    domain::{BriefFingerprint, Identity, Task, TaskId},
    ports::{TaskRepository, TaskRepositoryError, TaskRepositoryResult},
};

/// Thread-safe in-memory task repository.
///
/// Enforces the same version compare-and-set as a durable store, so services
/// exercise their optimistic-retry paths against it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskRepository {
    state: Arc<RwLock<InMemoryTaskState>>,
}

#[derive(Debug, Default)]
struct InMemoryTaskState {
    tasks: HashMap<TaskId, Task>,
    fingerprint_index: HashMap<BriefFingerprint, TaskId>,
    owner_index: HashMap<Identity, Vec<TaskId>>,
}

impl InMemoryTaskRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().map(|state| state.tasks.len()).unwrap_or(0)
    }

    /// Returns `true` if no tasks are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned(err: impl std::fmt::Display) -> TaskRepositoryError {
    TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn store(&self, task: &Task) -> TaskRepositoryResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        if state.tasks.contains_key(task.id()) {
            return Err(TaskRepositoryError::DuplicateTask(task.id().clone()));
        }
        if state.fingerprint_index.contains_key(task.fingerprint()) {
            return Err(TaskRepositoryError::DuplicateFingerprint(
                task.fingerprint().clone(),
            ));
        }

        state
            .fingerprint_index
            .insert(task.fingerprint().clone(), task.id().clone());
        if let Some(owner) = task.owner() {
            state
                .owner_index
                .entry(owner.clone())
                .or_default()
                .push(task.id().clone());
        }
        state.tasks.insert(task.id().clone(), task.clone());
        Ok(())
    }

    async fn update(&self, task: &Task) -> TaskRepositoryResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        let stored = state
            .tasks
            .get(task.id())
            .ok_or_else(|| TaskRepositoryError::NotFound(task.id().clone()))?;

        if stored.version().saturating_add(1) != task.version() {
            return Err(TaskRepositoryError::VersionConflict {
                task_id: task.id().clone(),
                stored: stored.version(),
                attempted: task.version(),
            });
        }

        state.tasks.insert(task.id().clone(), task.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &TaskId) -> TaskRepositoryResult<Option<Task>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.tasks.get(id).cloned())
    }

    async fn find_by_fingerprint(
        &self,
        fingerprint: &BriefFingerprint,
    ) -> TaskRepositoryResult<Option<Task>> {
        let state = self.state.read().map_err(poisoned)?;
        let task = state
            .fingerprint_index
            .get(fingerprint)
            .and_then(|task_id| state.tasks.get(task_id))
            .cloned();
        Ok(task)
    }

    async fn find_by_owner(&self, owner: &Identity) -> TaskRepositoryResult<Vec<Task>> {
        let state = self.state.read().map_err(poisoned)?;
        let tasks = state
            .owner_index
            .get(owner)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.tasks.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        Ok(tasks)
    }
}

//! Repository port for task persistence with per-task compare-and-set.

use crate::task::domain::{BriefFingerprint, Identity, Task, TaskId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for task repository operations.
pub type TaskRepositoryResult<T> = Result<T, TaskRepositoryError>;

/// Task persistence contract.
///
/// Implementations only need to guarantee atomic read-modify-write per task:
/// [`TaskRepository::update`] succeeds only when the stored version is the
/// one the caller read.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Stores a new task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::DuplicateTask`] when the task ID already
    /// exists or [`TaskRepositoryError::DuplicateFingerprint`] when another
    /// task was created from the same build request.
    async fn store(&self, task: &Task) -> TaskRepositoryResult<()>;

    /// Replaces a stored task whose version is exactly one below
    /// `task.version()`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] when the task does not exist
    /// and [`TaskRepositoryError::VersionConflict`] when another writer got
    /// there first.
    async fn update(&self, task: &Task) -> TaskRepositoryResult<()>;

    /// Finds a task by identifier.
    async fn find_by_id(&self, id: &TaskId) -> TaskRepositoryResult<Option<Task>>;

    /// Finds the task created from a build fingerprint.
    async fn find_by_fingerprint(
        &self,
        fingerprint: &BriefFingerprint,
    ) -> TaskRepositoryResult<Option<Task>>;

    /// Returns all tasks owned by an identity, oldest first.
    async fn find_by_owner(&self, owner: &Identity) -> TaskRepositoryResult<Vec<Task>>;
}

/// Errors returned by task repository implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskRepositoryError {
    /// A task with the same identifier already exists.
    #[error("duplicate task identifier: {0}")]
    DuplicateTask(TaskId),

    /// A task for the build fingerprint already exists.
    #[error("duplicate build fingerprint: {0}")]
    DuplicateFingerprint(BriefFingerprint),

    /// The task was not found.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The stored version moved on since the task was read.
    #[error("version conflict on task {task_id}: stored {stored}, attempted {attempted}")]
    VersionConflict {
        /// Task identifier.
        task_id: TaskId,
        /// Version currently stored.
        stored: u64,
        /// Version the writer tried to store.
        attempted: u64,
    },

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}

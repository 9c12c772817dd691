//! Authoritative task and round records behind per-task locking.

use super::{OrchestrationError, OrchestrationResult, TaskLocks, TemplateCatalog};
use crate::task::{
    domain::{
        Identity, NewTask, RoundAdmission, RoundNumber, RoundSpec, RoundState, RoundView, Task,
        TaskDomainError, TaskId, TaskSummary,
    },
    ports::{TaskRepository, TaskRepositoryError},
};
use mockable::Clock;
use std::sync::Arc;

/// Task registry service.
///
/// Every mutation runs under the task's lock and is persisted with a
/// compare-and-set on the task version. Reads never take the lock.
pub struct TaskRegistry<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    clock: Arc<C>,
    catalog: TemplateCatalog,
    locks: TaskLocks,
}

impl<R, C> TaskRegistry<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    /// Creates a registry.
    #[must_use]
    pub fn new(repository: Arc<R>, clock: Arc<C>, catalog: TemplateCatalog) -> Self {
        Self {
            repository,
            clock,
            catalog,
            locks: TaskLocks::new(),
        }
    }

    /// Returns the template catalog.
    #[must_use]
    pub const fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    /// Creates a task with round one, or returns the task an identical build
    /// request already created.
    ///
    /// The boolean is `true` when the task was created by this call.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidTemplate`] for templates outside the
    /// catalog, [`TaskDomainError::EmptyBrief`] for a blank brief, or a
    /// repository failure.
    pub async fn create_task(&self, request: &NewTask) -> OrchestrationResult<(Task, bool)> {
        if !self.catalog.contains(&request.template) {
            return Err(
                TaskDomainError::InvalidTemplate(request.template.as_str().to_owned()).into(),
            );
        }
        let fingerprint = request.fingerprint();
        if let Some(existing) = self.repository.find_by_fingerprint(&fingerprint).await? {
            return Ok((existing, false));
        }

        let task = Task::new(request, &*self.clock)?;
        match self.repository.store(&task).await {
            Ok(()) => {
                tracing::info!(
                    task_id = %task.id(),
                    template = %task.template(),
                    "task created"
                );
                Ok((task, true))
            }
            Err(TaskRepositoryError::DuplicateFingerprint(_)) => {
                let winner = self
                    .repository
                    .find_by_fingerprint(&fingerprint)
                    .await?
                    .ok_or_else(|| OrchestrationError::Interrupted {
                        task_id: task.id().clone(),
                        round: RoundNumber::FIRST,
                    })?;
                Ok((winner, false))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Admits a round request, opening or restarting the round when needed.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::TaskNotFound`] or the admission errors
    /// of [`Task::admit_round`].
    pub async fn create_round(
        &self,
        task_id: &TaskId,
        number: RoundNumber,
        spec: &RoundSpec,
    ) -> OrchestrationResult<(Task, RoundAdmission)> {
        let (task, admission) = self
            .mutate(task_id, |task, clock| {
                task.admit_round(number, spec.clone(), clock)
            })
            .await?;
        if matches!(admission, RoundAdmission::Opened | RoundAdmission::Restarted) {
            tracing::info!(
                task_id = %task_id,
                round = %number,
                admission = ?admission,
                "round admitted"
            );
        }
        Ok((task, admission))
    }

    /// Compare-and-set transition of one round.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Task::advance`] or a repository failure.
    pub async fn advance(
        &self,
        task_id: &TaskId,
        number: RoundNumber,
        from: RoundState,
        to: RoundState,
    ) -> OrchestrationResult<Task> {
        let (task, ()) = self
            .mutate(task_id, |task, clock| task.advance(number, from, to, clock))
            .await?;
        tracing::debug!(task_id = %task_id, round = %number, %from, %to, "round advanced");
        Ok(task)
    }

    /// Loads a task, applies `change` under the task lock, and persists the
    /// result when the change bumped the version.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::TaskNotFound`], the domain error raised
    /// by `change`, or a repository failure such as a version conflict.
    pub async fn mutate<T, F>(
        &self,
        task_id: &TaskId,
        change: F,
    ) -> OrchestrationResult<(Task, T)>
    where
        F: FnOnce(&mut Task, &C) -> Result<T, TaskDomainError>,
    {
        let _guard = self.locks.acquire(task_id).await;
        let mut task = self.load(task_id).await?;
        let read_version = task.version();
        let value = change(&mut task, self.clock.as_ref())?;
        if task.version() != read_version {
            self.repository.update(&task).await?;
        }
        Ok((task, value))
    }

    /// Applies `change` through [`TaskRegistry::mutate`], repeating it once
    /// when it loses a compare-and-set race.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::Conflict`] when the retry loses as
    /// well, otherwise the errors of [`TaskRegistry::mutate`].
    pub async fn transition<T, F>(
        &self,
        task_id: &TaskId,
        number: RoundNumber,
        change: F,
    ) -> OrchestrationResult<(Task, T)>
    where
        F: Fn(&mut Task, &C) -> Result<T, TaskDomainError>,
    {
        match self.mutate(task_id, &change).await {
            Err(first) if first.is_concurrency_guard() => {
                tracing::debug!(
                    task_id = %task_id,
                    round = %number,
                    error = %first,
                    "retrying transition"
                );
                match self.mutate(task_id, &change).await {
                    Err(second) if second.is_concurrency_guard() => {
                        tracing::warn!(
                            task_id = %task_id,
                            round = %number,
                            error = %second,
                            "transition kept losing its race"
                        );
                        Err(OrchestrationError::Conflict {
                            task_id: task_id.clone(),
                            round: number,
                        })
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Loads a task.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::TaskNotFound`] or a repository failure.
    pub async fn load(&self, task_id: &TaskId) -> OrchestrationResult<Task> {
        self.repository
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| OrchestrationError::TaskNotFound(task_id.clone()))
    }

    /// Returns the status of one round, or of the latest round when `round`
    /// is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::TaskNotFound`] or
    /// [`TaskDomainError::UnknownRound`].
    pub async fn get_status(
        &self,
        task_id: &TaskId,
        round: Option<RoundNumber>,
    ) -> OrchestrationResult<RoundView> {
        let task = self.load(task_id).await?;
        let found = match round {
            Some(number) => task.round(number),
            None => task.latest_round(),
        };
        let record = found.ok_or_else(|| TaskDomainError::UnknownRound {
            task_id: task_id.clone(),
            round: round.unwrap_or(RoundNumber::FIRST),
        })?;
        Ok(RoundView::of(&task, record))
    }

    /// Lists summaries of the tasks owned by `identity`.
    ///
    /// # Errors
    ///
    /// Returns a repository failure.
    pub async fn tasks_for_identity(
        &self,
        identity: &Identity,
    ) -> OrchestrationResult<Vec<TaskSummary>> {
        let tasks = self.repository.find_by_owner(identity).await?;
        Ok(tasks.iter().filter_map(TaskSummary::of).collect())
    }
}

impl<R, C> std::fmt::Debug for TaskRegistry<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("catalog", &self.catalog)
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

//! Reconciles evaluation callbacks with round records.

use super::{Ack, EvaluationCallback, OrchestrationError, OrchestrationResult, TaskRegistry};
use crate::task::{
    domain::{Evaluation, EvaluationOutcome, RoundNumber, TaskId, Verdict},
    ports::TaskRepository,
};
use mockable::Clock;
use std::sync::Arc;

/// Applies checker verdicts to published rounds.
///
/// Callbacks are serialized with round transitions through the registry's
/// per-task lock. Every callback is acknowledged; rejected reports are
/// logged and leave the record untouched.
pub struct EvaluationReconciler<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    registry: Arc<TaskRegistry<R, C>>,
}

impl<R, C> EvaluationReconciler<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    /// Creates a reconciler over `registry`.
    #[must_use]
    pub const fn new(registry: Arc<TaskRegistry<R, C>>) -> Self {
        Self { registry }
    }

    /// Handles a callback and returns the acknowledgement to send back.
    pub async fn receive(&self, callback: &EvaluationCallback) -> Ack {
        match self.reconcile(callback).await {
            Ok(outcome) => {
                tracing::info!(
                    task_id = %callback.task_id,
                    round = callback.round,
                    verdict = %callback.verdict,
                    outcome = ?outcome,
                    "evaluation reconciled"
                );
                Ack { accepted: true }
            }
            Err(err) => {
                tracing::warn!(
                    task_id = %callback.task_id,
                    round = callback.round,
                    error = %err,
                    "evaluation callback rejected"
                );
                Ack { accepted: false }
            }
        }
    }

    /// Records the reported verdict against its round.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed fields,
    /// [`OrchestrationError::TaskNotFound`], or the domain errors of
    /// [`crate::task::domain::Task::record_evaluation`] (unknown round,
    /// token mismatch, round not yet published).
    pub async fn reconcile(
        &self,
        callback: &EvaluationCallback,
    ) -> OrchestrationResult<EvaluationOutcome> {
        let task_id = TaskId::parse(callback.task_id.as_str())?;
        let number = RoundNumber::new(callback.round)?;
        let verdict = Verdict::try_from(callback.verdict.as_str())
            .map_err(|err| OrchestrationError::Validation(err.to_string()))?;

        let (_, outcome) = self
            .registry
            .transition(&task_id, number, |task, clock| {
                let received_at = clock.utc();
                let report = Evaluation {
                    verdict,
                    details: callback.details.clone(),
                    reported_at: callback.reported_at.unwrap_or(received_at),
                    received_at,
                };
                task.record_evaluation(
                    number,
                    report,
                    callback.correlation_token.as_deref(),
                    clock,
                )
            })
            .await?;
        Ok(outcome)
    }
}

impl<R, C> std::fmt::Debug for EvaluationReconciler<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationReconciler")
            .field("registry", &self.registry)
            .finish()
    }
}

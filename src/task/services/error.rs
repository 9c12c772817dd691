//! Error taxonomy surfaced by the orchestration services.

use crate::task::{
    domain::{FailureStage, RoundFailure, RoundNumber, TaskDomainError, TaskId},
    ports::TaskRepositoryError,
};
use thiserror::Error;

/// Errors returned by the controller, registry and reconciler.
///
/// The type is `Clone` so that one settled outcome can be replayed to every
/// caller that presented the same idempotency key.
#[derive(Debug, Clone, Error)]
pub enum OrchestrationError {
    /// The shared secret did not match.
    #[error("unauthorized: shared secret mismatch")]
    Unauthorized,

    /// The caller does not own the task it tried to revise.
    #[error("identity {identity} does not own task {task_id}")]
    NotTaskOwner {
        /// Task identifier.
        task_id: TaskId,
        /// Identity presented by the caller.
        identity: String,
    },

    /// A request field was missing or malformed outside the domain types.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Domain validation or state machine failure.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),

    /// The task does not exist.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// Repository failure.
    #[error(transparent)]
    Repository(#[from] TaskRepositoryError),

    /// The generation collaborator failed after all retries.
    #[error("generation failed for round {round} of task {task_id}: {reason}")]
    GenerationFailed {
        /// Task identifier.
        task_id: TaskId,
        /// Round number.
        round: RoundNumber,
        /// Last collaborator error.
        reason: String,
    },

    /// The publishing collaborator failed after all retries.
    #[error("publish failed for round {round} of task {task_id}: {reason}")]
    PublishFailed {
        /// Task identifier.
        task_id: TaskId,
        /// Round number.
        round: RoundNumber,
        /// Last collaborator error.
        reason: String,
        /// Location of an artifact that was created before the failure.
        partial_artifact_url: Option<String>,
    },

    /// A transition kept losing its compare-and-set race.
    #[error("concurrent update conflict on round {round} of task {task_id}")]
    Conflict {
        /// Task identifier.
        task_id: TaskId,
        /// Round number.
        round: RoundNumber,
    },

    /// Another request with the same key is still being processed.
    #[error("round {round} of task {task_id} is still processing")]
    StillProcessing {
        /// Task identifier.
        task_id: TaskId,
        /// Round number.
        round: RoundNumber,
    },

    /// The processing pipeline stopped before producing an outcome.
    #[error("processing of round {round} of task {task_id} was interrupted")]
    Interrupted {
        /// Task identifier.
        task_id: TaskId,
        /// Round number.
        round: RoundNumber,
    },
}

/// Result type for orchestration operations.
pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

impl OrchestrationError {
    /// Rebuilds the error a failed round originally surfaced with.
    #[must_use]
    pub fn from_failure(task_id: TaskId, round: RoundNumber, failure: &RoundFailure) -> Self {
        match failure.stage {
            FailureStage::Generation => Self::GenerationFailed {
                task_id,
                round,
                reason: failure.reason.clone(),
            },
            FailureStage::Publish => Self::PublishFailed {
                task_id,
                round,
                reason: failure.reason.clone(),
                partial_artifact_url: failure.partial_artifact_url.clone(),
            },
        }
    }

    /// Returns `true` for compare-and-set failures worth one more attempt.
    #[must_use]
    pub const fn is_concurrency_guard(&self) -> bool {
        match self {
            Self::Domain(err) => err.is_concurrency_guard(),
            Self::Repository(TaskRepositoryError::VersionConflict { .. }) => true,
            _ => false,
        }
    }

    /// Returns `true` when the caller sent an unusable request.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Domain(
                    TaskDomainError::InvalidIdentity(_)
                        | TaskDomainError::InvalidTemplate(_)
                        | TaskDomainError::InvalidTaskId(_)
                        | TaskDomainError::InvalidNonce(_)
                        | TaskDomainError::EmptyBrief
                        | TaskDomainError::ZeroRound(_)
                        | TaskDomainError::InvalidRoundNumber { .. }
                )
        )
    }

    /// Returns the task the error refers to, when known.
    #[must_use]
    pub const fn task_id(&self) -> Option<&TaskId> {
        match self {
            Self::NotTaskOwner { task_id, .. }
            | Self::TaskNotFound(task_id)
            | Self::GenerationFailed { task_id, .. }
            | Self::PublishFailed { task_id, .. }
            | Self::Conflict { task_id, .. }
            | Self::StillProcessing { task_id, .. }
            | Self::Interrupted { task_id, .. }
            | Self::Repository(
                TaskRepositoryError::NotFound(task_id)
                | TaskRepositoryError::DuplicateTask(task_id)
                | TaskRepositoryError::VersionConflict { task_id, .. },
            ) => Some(task_id),
            Self::Domain(err) => err.task_id(),
            _ => None,
        }
    }

    /// Returns the round the error refers to, when known.
    #[must_use]
    pub const fn round(&self) -> Option<RoundNumber> {
        match self {
            Self::GenerationFailed { round, .. }
            | Self::PublishFailed { round, .. }
            | Self::Conflict { round, .. }
            | Self::StillProcessing { round, .. }
            | Self::Interrupted { round, .. } => Some(*round),
            Self::Domain(err) => err.round(),
            _ => None,
        }
    }
}

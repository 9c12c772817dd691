//! Read models returned by status queries and replayed to callers.

use super::{
    DispatchStatus, Evaluation, Identity, Round, RoundFailure, RoundNumber, RoundState, Task,
    TaskId, TemplateKind,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundView {
    /// Task identifier.
    pub task_id: TaskId,
    /// Round number.
    pub round: RoundNumber,
    /// Round state.
    pub status: RoundState,
    /// Coarse dispatch status.
    pub dispatch_status: DispatchStatus,
    /// Brief text.
    pub brief: String,
    /// Ordered acceptance checks.
    pub checks: Vec<String>,
    /// Published (or partial) artifact URL.
    pub artifact_url: Option<String>,
    /// Publisher revision identifier.
    pub revision: Option<String>,
    /// Attempt counter for this round number.
    pub attempt: u32,
    /// Failure details when the round failed.
    pub failure: Option<RoundFailure>,
    /// Current evaluation.
    pub evaluation: Option<Evaluation>,
    /// Superseded and stale evaluations.
    pub evaluation_history: Vec<Evaluation>,
    /// Latest mutation of the round.
    pub updated_at: DateTime<Utc>,
}

impl RoundView {
    /// Builds a view of `round` within `task`.
    #[must_use]
    pub fn of(task: &Task, round: &Round) -> Self {
        Self {
            task_id: task.id().clone(),
            round: round.number(),
            status: round.state(),
            dispatch_status: round.state().dispatch_status(),
            brief: round.brief().to_owned(),
            checks: round.checks().to_vec(),
            artifact_url: round.artifact_url().map(str::to_owned),
            revision: round.revision().map(str::to_owned),
            attempt: round.attempt(),
            failure: round.failure().cloned(),
            evaluation: round.evaluation().cloned(),
            evaluation_history: round.evaluation_history().to_vec(),
            updated_at: round.updated_at(),
        }
    }
}

/// Summary of a task for identity listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    /// Task identifier.
    pub task_id: TaskId,
    /// Owning identity.
    pub owner: Option<Identity>,
    /// Template kind.
    pub template: TemplateKind,
    /// Highest round number.
    pub latest_round: RoundNumber,
    /// State of the highest round.
    pub status: RoundState,
    /// Live artifact URL.
    pub artifact_url: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Latest mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl TaskSummary {
    /// Summarizes a task, or returns `None` for a task without rounds.
    #[must_use]
    pub fn of(task: &Task) -> Option<Self> {
        let latest = task.latest_round()?;
        Some(Self {
            task_id: task.id().clone(),
            owner: task.owner().cloned(),
            template: task.template().clone(),
            latest_round: latest.number(),
            status: latest.state(),
            artifact_url: task.live_artifact_url().map(str::to_owned),
            created_at: task.created_at(),
            updated_at: task.updated_at(),
        })
    }
}

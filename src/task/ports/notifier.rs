//! Port for announcing published rounds to the external checker.

use super::CollaboratorError;
use crate::task::domain::{Identity, Nonce, RoundNumber, TaskId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Payload sent to the checker once a round is live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationNotice {
    /// Owner of the task.
    pub identity: Option<Identity>,
    /// Task identifier.
    pub task_id: TaskId,
    /// Published round.
    pub round: RoundNumber,
    /// Nonce of the request that produced the round.
    pub nonce: Nonce,
    /// Live artifact location.
    pub artifact_url: String,
    /// Publisher revision, when reported.
    pub revision: Option<String>,
    /// Token the checker should echo in its callback.
    pub correlation_token: String,
}

/// Delivers evaluation notices.
#[async_trait]
pub trait EvaluationNotifier: Send + Sync {
    /// Sends a notice to the checker endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] when delivery fails.
    async fn notify(&self, endpoint: &str, notice: &EvaluationNotice)
    -> Result<(), CollaboratorError>;
}

//! Port for the external hosting collaborator.

use super::CollaboratorError;
use crate::task::domain::{PublishReceipt, RoundNumber, SourceBundle, TaskId};
use async_trait::async_trait;

/// Where a round's artifact must be published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTarget {
    /// Task whose artifact is updated.
    pub task_id: TaskId,
    /// Round being published.
    pub round: RoundNumber,
    /// Live artifact of the task, which must be updated in place.
    pub live_artifact_url: Option<String>,
}

/// Publishes a source bundle as the task's single live artifact.
///
/// Implementations key the artifact location by task, so publishing a later
/// round replaces the content behind the same URL.
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    /// Creates or updates the live artifact.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError::PartialPublish`] when the artifact exists
    /// but a follow-up step failed, or another classified failure.
    async fn publish(
        &self,
        target: &PublishTarget,
        bundle: &SourceBundle,
    ) -> Result<PublishReceipt, CollaboratorError>;
}

//! Port for the external code-generation collaborator.

use super::CollaboratorError;
use crate::task::domain::{RoundNumber, SourceBundle, TaskId, TemplateKind};
use async_trait::async_trait;

/// Input handed to the generation collaborator for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Task being built.
    pub task_id: TaskId,
    /// Round being built.
    pub round: RoundNumber,
    /// Template kind of the task.
    pub template: TemplateKind,
    /// Round brief.
    pub brief: String,
    /// Acceptance checks the artifact should satisfy.
    pub checks: Vec<String>,
    /// Source of the latest published round, for revisions.
    pub prior_artifact: Option<SourceBundle>,
}

/// Produces a source bundle from a natural-language brief.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Generates (or revises) the artifact sources.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] classified as transient or terminal.
    async fn generate(&self, request: &GenerationRequest)
    -> Result<SourceBundle, CollaboratorError>;
}

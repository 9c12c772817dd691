//! Port contracts for task lifecycle orchestration.
//!
//! Ports define infrastructure-agnostic interfaces used by task services:
//! the durable task store and the external generation, hosting and checker
//! collaborators.

pub mod collaborator;
pub mod generator;
pub mod notifier;
pub mod publisher;
pub mod repository;

pub use collaborator::CollaboratorError;
pub use generator::{CodeGenerator, GenerationRequest};
pub use notifier::{EvaluationNotice, EvaluationNotifier};
pub use publisher::{ArtifactPublisher, PublishTarget};
pub use repository::{TaskRepository, TaskRepositoryError, TaskRepositoryResult};

//! Application services for round orchestration.
//!
//! [`RoundController`] admits build and revise requests and drives rounds
//! through the collaborator dispatchers, [`EvaluationReconciler`] applies
//! checker callbacks, and [`TaskRegistry`] owns the authoritative records.

mod controller;
mod dedup;
mod dispatch;
mod error;
mod guard;
mod locks;
mod readme;
mod reconciler;
mod registry;
mod requests;
mod retry;

pub use controller::{ControllerSettings, RoundController};
pub use dedup::{
    Admission, FollowerWait, IdempotencyFilter, IdempotencyKey, LeaderTicket, RoundOutcome,
};
pub use dispatch::{DispatchFailure, GenerationDispatcher, NotifyDispatcher, PublishDispatcher};
pub use error::{OrchestrationError, OrchestrationResult};
pub use guard::{
    AuthorizationGuard, DEFAULT_TEMPLATES, SharedSecret, TemplateCatalog, optional_identity,
};
pub use locks::TaskLocks;
pub use readme::{README_PATH, ReadmeRenderer};
pub use reconciler::EvaluationReconciler;
pub use registry::TaskRegistry;
pub use requests::{Ack, BuildRequest, EvaluationCallback, ReviseRequest};
pub use retry::{RetryExhausted, RetryPolicy, RetryPredicate};

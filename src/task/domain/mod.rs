//! Domain model for task and round lifecycle management.
//!
//! The task domain models round sequencing, the per-round state machine,
//! nonce-based idempotency, and evaluation bookkeeping while keeping all
//! infrastructure concerns outside of the domain boundary.

mod artifact;
mod digest;
mod error;
mod ids;
mod round;
mod task;
mod view;

pub use artifact::{PublishReceipt, SourceBundle};
pub use digest::PayloadDigest;
pub use error::{ParseRoundStateError, ParseVerdictError, TaskDomainError};
pub use ids::{BriefFingerprint, Identity, Nonce, RoundNumber, TaskId, TemplateKind};
pub use round::{
    DispatchStatus, EarlierAttempt, Evaluation, EvaluationOutcome, FailureStage, Round,
    RoundFailure, RoundSpec, RoundState, Verdict,
};
pub use task::{NewTask, PersistedTaskData, RoundAdmission, Task};
pub use view::{RoundView, TaskSummary};

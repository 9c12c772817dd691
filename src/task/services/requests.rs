//! Request and acknowledgement records accepted by the services.
//!
//! Field aliases accept the names used by existing checker clients
//! (`email` and `task`).

use super::SharedSecret;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request to build a new artifact (round one).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    /// Caller identity, optional for builds.
    #[serde(default, alias = "email")]
    pub identity: Option<String>,
    /// Shared secret.
    pub secret: SharedSecret,
    /// Template kind from the catalog.
    #[serde(alias = "task")]
    pub task_template: String,
    /// Natural-language brief.
    pub brief: String,
    /// Acceptance checks.
    #[serde(default)]
    pub checks: Vec<String>,
    /// Where to announce the published artifact.
    #[serde(default)]
    pub evaluation_url: Option<String>,
}

/// Request to revise an existing artifact (round two and later).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviseRequest {
    /// Caller identity; must own the task.
    #[serde(alias = "email")]
    pub identity: String,
    /// Shared secret.
    pub secret: SharedSecret,
    /// Task to revise.
    #[serde(alias = "task")]
    pub task_id: String,
    /// Round number being requested.
    pub round: u32,
    /// Idempotency token; required for revisions.
    #[serde(default)]
    pub nonce: Option<String>,
    /// Natural-language brief for this round.
    pub brief: String,
    /// Acceptance checks for this round.
    #[serde(default)]
    pub checks: Vec<String>,
    /// Where to announce the published artifact.
    #[serde(default)]
    pub evaluation_url: Option<String>,
}

/// Evaluation report pushed by the external checker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationCallback {
    /// Evaluated task.
    #[serde(alias = "task")]
    pub task_id: String,
    /// Evaluated round.
    pub round: u32,
    /// Verdict text (`pass`, `fail`, `partial`).
    pub verdict: String,
    /// Free-form details.
    #[serde(default)]
    pub details: Option<serde_json::Value>,
    /// When the checker produced the report; defaults to receipt time.
    #[serde(default)]
    pub reported_at: Option<DateTime<Utc>>,
    /// Token issued with the evaluation notice.
    #[serde(default)]
    pub correlation_token: Option<String>,
}

/// Acknowledgement returned for every evaluation callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Whether the report changed or confirmed the round record.
    pub accepted: bool,
}

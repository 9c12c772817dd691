//! Round entity, its state machine, and evaluation records.

use super::{
    Nonce, ParseRoundStateError, ParseVerdictError, PayloadDigest, PublishReceipt, RoundNumber,
    SourceBundle,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a single round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundState {
    /// Round reserved, nothing dispatched yet.
    Pending,
    /// Generation collaborator is producing the source bundle.
    Generating,
    /// Source bundle received.
    Generated,
    /// Publish collaborator is updating the live artifact.
    Publishing,
    /// Artifact is live and awaiting evaluation.
    Published,
    /// An evaluation verdict has been recorded.
    Evaluated,
    /// A dispatcher failed after exhausting retries.
    Failed,
}

impl RoundState {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Generating => "GENERATING",
            Self::Generated => "GENERATED",
            Self::Publishing => "PUBLISHING",
            Self::Published => "PUBLISHED",
            Self::Evaluated => "EVALUATED",
            Self::Failed => "FAILED",
        }
    }

    /// Returns `true` when the state machine permits moving to `target`.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Generating)
                | (Self::Generating, Self::Generated | Self::Failed)
                | (Self::Generated, Self::Publishing)
                | (Self::Publishing, Self::Published | Self::Failed)
                | (Self::Published, Self::Evaluated)
        )
    }

    /// Returns `true` once the round has a live artifact.
    #[must_use]
    pub const fn is_publish_complete(self) -> bool {
        matches!(self, Self::Published | Self::Evaluated)
    }

    /// Returns `true` when no dispatcher is working on the round.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Published | Self::Evaluated | Self::Failed)
    }

    /// Collapses the fine-grained state into the dispatch status.
    #[must_use]
    pub const fn dispatch_status(self) -> DispatchStatus {
        match self {
            Self::Pending => DispatchStatus::Pending,
            Self::Generating | Self::Generated | Self::Publishing => DispatchStatus::Dispatched,
            Self::Published | Self::Evaluated => DispatchStatus::Published,
            Self::Failed => DispatchStatus::Failed,
        }
    }
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for RoundState {
    type Error = ParseRoundStateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_uppercase();
        match normalized.as_str() {
            "PENDING" => Ok(Self::Pending),
            "GENERATING" => Ok(Self::Generating),
            "GENERATED" => Ok(Self::Generated),
            "PUBLISHING" => Ok(Self::Publishing),
            "PUBLISHED" => Ok(Self::Published),
            "EVALUATED" => Ok(Self::Evaluated),
            "FAILED" => Ok(Self::Failed),
            _ => Err(ParseRoundStateError(value.to_owned())),
        }
    }
}

/// Coarse dispatch status reported alongside the round state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// Not yet handed to a dispatcher.
    Pending,
    /// A dispatcher owns the round.
    Dispatched,
    /// The artifact is live.
    Published,
    /// Dispatch failed.
    Failed,
}

/// Evaluation verdict reported by the external checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// All checks passed.
    Pass,
    /// Checks failed.
    Fail,
    /// Some checks passed.
    Partial,
}

impl Verdict {
    /// Returns the canonical representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Partial => "partial",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Verdict {
    type Error = ParseVerdictError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pass" | "passed" => Ok(Self::Pass),
            "fail" | "failed" => Ok(Self::Fail),
            "partial" => Ok(Self::Partial),
            _ => Err(ParseVerdictError(value.to_owned())),
        }
    }
}

/// A verdict as recorded against a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Reported verdict.
    pub verdict: Verdict,
    /// Free-form checker details.
    pub details: Option<serde_json::Value>,
    /// Timestamp supplied by the reporter.
    pub reported_at: DateTime<Utc>,
    /// Timestamp at which the report was received.
    pub received_at: DateTime<Utc>,
}

/// How a reported evaluation was reconciled with the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationOutcome {
    /// First verdict for the round.
    Recorded,
    /// Same verdict as already stored.
    Unchanged,
    /// Later report replaced a different verdict, which moved to history.
    Superseded {
        /// Verdict that was replaced.
        previous: Verdict,
    },
    /// Earlier report with a different verdict; kept in history only.
    Stale {
        /// Verdict that remains current.
        current: Verdict,
    },
}

/// Pipeline stage at which a round failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// Generation collaborator failed.
    Generation,
    /// Publish collaborator failed.
    Publish,
}

/// Reason a round ended in [`RoundState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundFailure {
    /// Failing stage.
    pub stage: FailureStage,
    /// Human-readable reason.
    pub reason: String,
    /// Artifact location left behind by a partial publish.
    pub partial_artifact_url: Option<String>,
}

/// A failed attempt that a later request with a new nonce replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarlierAttempt {
    /// Nonce the attempt ran under.
    pub nonce: Nonce,
    /// Payload digest of the attempt's request.
    pub digest: PayloadDigest,
    /// Why the attempt failed.
    pub failure: RoundFailure,
}

/// Input for opening a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSpec {
    /// Brief text for the round.
    pub brief: String,
    /// Ordered acceptance checks.
    pub checks: Vec<String>,
    /// Idempotency token.
    pub nonce: Nonce,
    /// Where to announce the published artifact, if anywhere.
    pub evaluation_url: Option<String>,
}

impl RoundSpec {
    /// Returns the payload digest compared on nonce replays.
    #[must_use]
    pub fn digest(&self) -> PayloadDigest {
        PayloadDigest::of(&self.brief, &self.checks)
    }
}

/// One build-or-revise iteration of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    number: RoundNumber,
    brief: String,
    checks: Vec<String>,
    nonce: Nonce,
    digest: PayloadDigest,
    evaluation_url: Option<String>,
    state: RoundState,
    attempt: u32,
    source: Option<SourceBundle>,
    artifact_url: Option<String>,
    revision: Option<String>,
    correlation_token: Option<String>,
    failure: Option<RoundFailure>,
    earlier_attempts: Vec<EarlierAttempt>,
    evaluation: Option<Evaluation>,
    evaluation_history: Vec<Evaluation>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Round {
    pub(crate) fn open(number: RoundNumber, spec: RoundSpec, now: DateTime<Utc>) -> Self {
        let digest = spec.digest();
        Self {
            number,
            brief: spec.brief,
            checks: spec.checks,
            nonce: spec.nonce,
            digest,
            evaluation_url: spec.evaluation_url,
            state: RoundState::Pending,
            attempt: 1,
            source: None,
            artifact_url: None,
            revision: None,
            correlation_token: None,
            failure: None,
            earlier_attempts: Vec::new(),
            evaluation: None,
            evaluation_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the round number.
    #[must_use]
    pub const fn number(&self) -> RoundNumber {
        self.number
    }

    /// Returns the brief.
    #[must_use]
    pub fn brief(&self) -> &str {
        &self.brief
    }

    /// Returns the ordered acceptance checks.
    #[must_use]
    pub fn checks(&self) -> &[String] {
        &self.checks
    }

    /// Returns the nonce of the accepted request.
    #[must_use]
    pub const fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    /// Returns the payload digest of the accepted request.
    #[must_use]
    pub const fn digest(&self) -> &PayloadDigest {
        &self.digest
    }

    /// Returns the evaluation notification target.
    #[must_use]
    pub fn evaluation_url(&self) -> Option<&str> {
        self.evaluation_url.as_deref()
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> RoundState {
        self.state
    }

    /// Returns how many times the round has been attempted.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the generated source bundle, once known.
    #[must_use]
    pub const fn source(&self) -> Option<&SourceBundle> {
        self.source.as_ref()
    }

    /// Returns the published artifact URL (or the partial one after a failed
    /// publish).
    #[must_use]
    pub fn artifact_url(&self) -> Option<&str> {
        self.artifact_url.as_deref()
    }

    /// Returns the publisher revision identifier.
    #[must_use]
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    /// Returns the correlation token issued at publish time.
    #[must_use]
    pub fn correlation_token(&self) -> Option<&str> {
        self.correlation_token.as_deref()
    }

    /// Returns the failure of the current attempt.
    #[must_use]
    pub const fn failure(&self) -> Option<&RoundFailure> {
        self.failure.as_ref()
    }

    /// Returns the failed attempts replaced by later requests, oldest first.
    #[must_use]
    pub fn earlier_attempts(&self) -> &[EarlierAttempt] {
        &self.earlier_attempts
    }

    /// Returns the replaced attempt that ran under `nonce`.
    #[must_use]
    pub fn earlier_attempt(&self, nonce: &Nonce) -> Option<&EarlierAttempt> {
        self.earlier_attempts
            .iter()
            .find(|attempt| &attempt.nonce == nonce)
    }

    /// Returns the current evaluation.
    #[must_use]
    pub const fn evaluation(&self) -> Option<&Evaluation> {
        self.evaluation.as_ref()
    }

    /// Returns superseded and stale evaluations.
    #[must_use]
    pub fn evaluation_history(&self) -> &[Evaluation] {
        &self.evaluation_history
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest mutation timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub(crate) fn set_state(&mut self, state: RoundState, now: DateTime<Utc>) {
        self.state = state;
        self.updated_at = now;
    }

    pub(crate) fn set_source(&mut self, source: SourceBundle) {
        self.source = Some(source);
    }

    pub(crate) fn set_published(&mut self, receipt: PublishReceipt, correlation_token: String) {
        self.artifact_url = Some(receipt.artifact_url);
        self.revision = receipt.revision;
        self.correlation_token = Some(correlation_token);
    }

    pub(crate) fn set_failure(&mut self, failure: RoundFailure) {
        if let Some(url) = &failure.partial_artifact_url {
            self.artifact_url = Some(url.clone());
        }
        self.failure = Some(failure);
    }

    /// Resets a failed round for another attempt under a new request.
    pub(crate) fn restart(&mut self, spec: RoundSpec, now: DateTime<Utc>) {
        if let Some(failure) = self.failure.take() {
            self.earlier_attempts.push(EarlierAttempt {
                nonce: self.nonce.clone(),
                digest: self.digest.clone(),
                failure,
            });
        }
        self.digest = spec.digest();
        self.brief = spec.brief;
        self.checks = spec.checks;
        self.nonce = spec.nonce;
        self.evaluation_url = spec.evaluation_url;
        self.attempt = self.attempt.saturating_add(1);
        self.source = None;
        self.artifact_url = None;
        self.revision = None;
        self.correlation_token = None;
        self.set_state(RoundState::Pending, now);
    }

    /// Applies a verdict, keeping every replaced or stale verdict in history.
    pub(crate) fn apply_evaluation(&mut self, report: Evaluation) -> EvaluationOutcome {
        let Some(current) = self.evaluation.as_ref() else {
            self.evaluation = Some(report);
            return EvaluationOutcome::Recorded;
        };

        if current.verdict == report.verdict {
            return EvaluationOutcome::Unchanged;
        }

        if report.reported_at > current.reported_at {
            let previous = current.verdict;
            if let Some(replaced) = self.evaluation.replace(report) {
                self.evaluation_history.push(replaced);
            }
            EvaluationOutcome::Superseded { previous }
        } else {
            let current_verdict = current.verdict;
            self.evaluation_history.push(report);
            EvaluationOutcome::Stale {
                current: current_verdict,
            }
        }
    }
}

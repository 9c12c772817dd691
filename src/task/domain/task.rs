//! Task aggregate root and its round sequence.

use super::{
    BriefFingerprint, Evaluation, EvaluationOutcome, FailureStage, Identity, Nonce,
    PublishReceipt, Round, RoundFailure, RoundNumber, RoundSpec, RoundState, SourceBundle,
    TaskDomainError, TaskId, TemplateKind,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// Validated input for creating a task with its first round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    /// Owning identity, when the caller supplied one.
    pub owner: Option<Identity>,
    /// Template kind from the catalog.
    pub template: TemplateKind,
    /// Round-one brief.
    pub brief: String,
    /// Round-one acceptance checks.
    pub checks: Vec<String>,
    /// Evaluation notification target for round one.
    pub evaluation_url: Option<String>,
}

impl NewTask {
    /// Returns the create-or-get fingerprint of this request.
    #[must_use]
    pub fn fingerprint(&self) -> BriefFingerprint {
        BriefFingerprint::of_build(self.owner.as_ref(), &self.template, &self.brief)
    }

    /// Returns the round-one request with its implicit nonce.
    #[must_use]
    pub fn first_round(&self) -> RoundSpec {
        RoundSpec {
            brief: self.brief.trim().to_owned(),
            checks: self.checks.clone(),
            nonce: Nonce::implicit(&self.fingerprint()),
            evaluation_url: self.evaluation_url.clone(),
        }
    }
}

/// How a round request was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundAdmission {
    /// A new round was appended.
    Opened,
    /// A failed round was reset for another attempt.
    Restarted,
    /// The nonce matches the stored request; nothing changed.
    Existing,
    /// The nonce belongs to a failed attempt a later request replaced;
    /// nothing changed.
    Superseded,
}

/// Task aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    owner: Option<Identity>,
    template: TemplateKind,
    fingerprint: BriefFingerprint,
    rounds: Vec<Round>,
    live_artifact_url: Option<String>,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted task aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedTaskData {
    /// Persisted task identifier.
    pub id: TaskId,
    /// Persisted owner.
    pub owner: Option<Identity>,
    /// Persisted template kind.
    pub template: TemplateKind,
    /// Persisted round-one fingerprint.
    pub fingerprint: BriefFingerprint,
    /// Persisted rounds, ordered by number.
    pub rounds: Vec<Round>,
    /// Persisted live artifact location.
    pub live_artifact_url: Option<String>,
    /// Persisted optimistic-concurrency version.
    pub version: u64,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted latest mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a task with round one in [`RoundState::Pending`].
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyBrief`] when the brief is blank.
    pub fn new(request: &NewTask, clock: &impl Clock) -> Result<Self, TaskDomainError> {
        if request.brief.trim().is_empty() {
            return Err(TaskDomainError::EmptyBrief);
        }
        let timestamp = clock.utc();
        let first = Round::open(RoundNumber::FIRST, request.first_round(), timestamp);

        Ok(Self {
            id: TaskId::generate(&request.template),
            owner: request.owner.clone(),
            template: request.template.clone(),
            fingerprint: request.fingerprint(),
            rounds: vec![first],
            live_artifact_url: None,
            version: 1,
            created_at: timestamp,
            updated_at: timestamp,
        })
    }

    /// Reconstructs a task from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedTaskData) -> Self {
        Self {
            id: data.id,
            owner: data.owner,
            template: data.template,
            fingerprint: data.fingerprint,
            rounds: data.rounds,
            live_artifact_url: data.live_artifact_url,
            version: data.version,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> &TaskId {
        &self.id
    }

    /// Returns the owning identity, if any.
    #[must_use]
    pub const fn owner(&self) -> Option<&Identity> {
        self.owner.as_ref()
    }

    /// Returns the template kind.
    #[must_use]
    pub const fn template(&self) -> &TemplateKind {
        &self.template
    }

    /// Returns the round-one fingerprint.
    #[must_use]
    pub const fn fingerprint(&self) -> &BriefFingerprint {
        &self.fingerprint
    }

    /// Returns all rounds in order.
    #[must_use]
    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    /// Returns a round by number.
    #[must_use]
    pub fn round(&self, number: RoundNumber) -> Option<&Round> {
        self.rounds.iter().find(|round| round.number() == number)
    }

    /// Returns the highest-numbered round.
    #[must_use]
    pub fn latest_round(&self) -> Option<&Round> {
        self.rounds.last()
    }

    /// Returns the URL of the single live artifact of this task.
    #[must_use]
    pub fn live_artifact_url(&self) -> Option<&str> {
        self.live_artifact_url.as_deref()
    }

    /// Returns the optimistic-concurrency version.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
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

    /// Returns the source bundle of the round preceding `number`.
    #[must_use]
    pub fn prior_source(&self, number: RoundNumber) -> Option<&SourceBundle> {
        self.rounds
            .iter()
            .rev()
            .filter(|round| round.number() < number && round.state().is_publish_complete())
            .find_map(Round::source)
    }

    /// Admits a round request, enforcing contiguity and nonce rules.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::DuplicateNonce`] when the nonce is known
    /// with another payload, including nonces of replaced attempts, [`TaskDomainError::RoundAlreadyExists`] when the
    /// round exists under another nonce and has not failed, and
    /// [`TaskDomainError::InvalidRoundNumber`] when the number is not the
    /// next one or the previous round is not yet published.
    pub fn admit_round(
        &mut self,
        number: RoundNumber,
        spec: RoundSpec,
        clock: &impl Clock,
    ) -> Result<RoundAdmission, TaskDomainError> {
        let task_id = self.id.clone();
        if let Some(existing) = self.rounds.iter_mut().find(|round| round.number() == number) {
            let same_nonce = existing.nonce() == &spec.nonce;
            if same_nonce && existing.digest() != &spec.digest() {
                return Err(TaskDomainError::DuplicateNonce {
                    task_id,
                    round: number,
                });
            }
            // Round one has no caller nonce, so resubmitting the build is
            // the only way to retry it.
            let retry_first = same_nonce && number.is_first();
            if same_nonce && !(retry_first && existing.state() == RoundState::Failed) {
                return Ok(RoundAdmission::Existing);
            }
            if let Some(earlier) = existing.earlier_attempt(&spec.nonce) {
                if earlier.digest != spec.digest() {
                    return Err(TaskDomainError::DuplicateNonce {
                        task_id,
                        round: number,
                    });
                }
                return Ok(RoundAdmission::Superseded);
            }
            if existing.state() != RoundState::Failed {
                return Err(TaskDomainError::RoundAlreadyExists {
                    task_id,
                    round: number,
                });
            }
            existing.restart(spec, clock.utc());
            self.touch(clock);
            return Ok(RoundAdmission::Restarted);
        }

        let latest = self
            .rounds
            .last()
            .map_or(RoundNumber::FIRST, Round::number);
        let expected = latest.next();
        let previous_done = self
            .rounds
            .last()
            .is_some_and(|round| round.state().is_publish_complete());
        if number != expected || !previous_done {
            return Err(TaskDomainError::InvalidRoundNumber {
                task_id,
                requested: number,
                expected: if previous_done { expected } else { latest },
            });
        }

        self.rounds.push(Round::open(number, spec, clock.utc()));
        self.touch(clock);
        Ok(RoundAdmission::Opened)
    }

    /// Compare-and-set transition of one round.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::UnknownRound`] for a missing round,
    /// [`TaskDomainError::StaleState`] when the round is not in `from`, and
    /// [`TaskDomainError::InvalidTransition`] when `from -> to` is not an
    /// edge of the state machine.
    pub fn advance(
        &mut self,
        number: RoundNumber,
        from: RoundState,
        to: RoundState,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        let task_id = self.id.clone();
        let timestamp = clock.utc();
        let round = self.round_mut(number)?;
        if round.state() != from {
            return Err(TaskDomainError::StaleState {
                task_id,
                round: number,
                expected: from,
                actual: round.state(),
            });
        }
        if !from.can_transition_to(to) {
            return Err(TaskDomainError::InvalidTransition {
                task_id,
                round: number,
                from,
                to,
            });
        }
        round.set_state(to, timestamp);
        self.touch(clock);
        Ok(())
    }

    /// Moves a round from `GENERATING` to `GENERATED`, storing the bundle.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Task::advance`].
    pub fn record_generated(
        &mut self,
        number: RoundNumber,
        source: SourceBundle,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        self.advance(number, RoundState::Generating, RoundState::Generated, clock)?;
        self.round_mut(number)?.set_source(source);
        Ok(())
    }

    /// Moves a round from `PUBLISHING` to `PUBLISHED` and makes its artifact
    /// the live one.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Task::advance`].
    pub fn record_published(
        &mut self,
        number: RoundNumber,
        receipt: PublishReceipt,
        correlation_token: String,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        self.advance(number, RoundState::Publishing, RoundState::Published, clock)?;
        self.live_artifact_url = Some(receipt.artifact_url.clone());
        self.round_mut(number)?
            .set_published(receipt, correlation_token);
        Ok(())
    }

    /// Moves a round from `from` to `FAILED` with the given reason.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Task::advance`].
    pub fn record_failure(
        &mut self,
        number: RoundNumber,
        from: RoundState,
        failure: RoundFailure,
        clock: &impl Clock,
    ) -> Result<(), TaskDomainError> {
        self.advance(number, from, RoundState::Failed, clock)?;
        self.round_mut(number)?.set_failure(failure);
        Ok(())
    }

    /// Fails a round that stopped short of a settled state, walking the
    /// legal edges from its current state to `FAILED`.
    ///
    /// Returns `false` when the round has already settled.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::UnknownRound`] for a missing round.
    pub fn abandon(
        &mut self,
        number: RoundNumber,
        reason: &str,
        clock: &impl Clock,
    ) -> Result<bool, TaskDomainError> {
        let state = self.round_mut(number)?.state();
        let (stage, from) = match state {
            RoundState::Pending => {
                self.advance(number, state, RoundState::Generating, clock)?;
                (FailureStage::Generation, RoundState::Generating)
            }
            RoundState::Generating => (FailureStage::Generation, state),
            RoundState::Generated => {
                self.advance(number, state, RoundState::Publishing, clock)?;
                (FailureStage::Publish, RoundState::Publishing)
            }
            RoundState::Publishing => (FailureStage::Publish, state),
            RoundState::Published | RoundState::Evaluated | RoundState::Failed => {
                return Ok(false);
            }
        };
        let failure = RoundFailure {
            stage,
            reason: reason.to_owned(),
            partial_artifact_url: None,
        };
        self.record_failure(number, from, failure, clock)?;
        Ok(true)
    }

    /// Reconciles an evaluation report with the round.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::UnknownRound`],
    /// [`TaskDomainError::CorrelationMismatch`] when a supplied token does
    /// not match the issued one, or [`TaskDomainError::RoundNotPublished`]
    /// when the round has no live artifact.
    pub fn record_evaluation(
        &mut self,
        number: RoundNumber,
        report: Evaluation,
        correlation_token: Option<&str>,
        clock: &impl Clock,
    ) -> Result<EvaluationOutcome, TaskDomainError> {
        let task_id = self.id.clone();
        let timestamp = clock.utc();
        let round = self.round_mut(number)?;

        if let (Some(supplied), Some(issued)) = (correlation_token, round.correlation_token()) {
            if supplied != issued {
                return Err(TaskDomainError::CorrelationMismatch {
                    task_id,
                    round: number,
                });
            }
        }

        let outcome = match round.state() {
            RoundState::Published => {
                let outcome = round.apply_evaluation(report);
                round.set_state(RoundState::Evaluated, timestamp);
                outcome
            }
            RoundState::Evaluated => round.apply_evaluation(report),
            state => {
                return Err(TaskDomainError::RoundNotPublished {
                    task_id,
                    round: number,
                    state,
                });
            }
        };

        if outcome != EvaluationOutcome::Unchanged {
            self.touch(clock);
        }
        Ok(outcome)
    }

    fn round_mut(&mut self, number: RoundNumber) -> Result<&mut Round, TaskDomainError> {
        let task_id = self.id.clone();
        self.rounds
            .iter_mut()
            .find(|round| round.number() == number)
            .ok_or(TaskDomainError::UnknownRound {
                task_id,
                round: number,
            })
    }

    /// Updates the timestamp and bumps the version for compare-and-set.
    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc();
        self.version = self.version.saturating_add(1);
    }
}

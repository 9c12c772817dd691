//! Round controller: admits build and revise requests and drives each round
//! through generation, publishing and evaluation notice.
//!
//! A request is first authorized and validated, then admitted by the
//! [`IdempotencyFilter`]. The leader of a key runs the pipeline on a spawned
//! task so the round completes even if the caller disconnects; followers
//! wait for the leader's outcome and later callers receive it verbatim.

use super::{
    Admission, AuthorizationGuard, BuildRequest, DispatchFailure, GenerationDispatcher,
    IdempotencyFilter, IdempotencyKey, LeaderTicket, NotifyDispatcher, OrchestrationError,
    OrchestrationResult, PublishDispatcher, ReadmeRenderer, ReviseRequest, RoundOutcome,
    TaskRegistry, optional_identity,
};
use crate::task::{
    domain::{
        FailureStage, Identity, NewTask, Nonce, Round, RoundAdmission, RoundFailure,
        RoundNumber, RoundSpec, RoundState, RoundView, Task, TaskDomainError, TaskId, TaskSummary,
    },
    ports::{EvaluationNotice, GenerationRequest, PublishTarget, TaskRepository},
};
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

/// Tunables of the round controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    /// How long a duplicate request waits for the in-flight original.
    pub inflight_wait: Duration,
    /// How long settled outcomes stay in the replay cache; `None` keeps them
    /// for the life of the process.
    pub replay_retention: Option<Duration>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            inflight_wait: Duration::from_secs(30),
            replay_retention: None,
        }
    }
}

/// Orchestrates build and revise requests.
pub struct RoundController<R, C>
where
    R: TaskRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    registry: Arc<TaskRegistry<R, C>>,
    guard: AuthorizationGuard,
    generation: GenerationDispatcher,
    publish: PublishDispatcher,
    notify: Option<NotifyDispatcher>,
    filter: IdempotencyFilter,
    readme: ReadmeRenderer,
    inflight_wait: Duration,
}

impl<R, C> Clone for RoundController<R, C>
where
    R: TaskRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            guard: self.guard.clone(),
            generation: self.generation.clone(),
            publish: self.publish.clone(),
            notify: self.notify.clone(),
            filter: self.filter.clone(),
            readme: self.readme,
            inflight_wait: self.inflight_wait,
        }
    }
}

impl<R, C> std::fmt::Debug for RoundController<R, C>
where
    R: TaskRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundController")
            .field("registry", &self.registry)
            .field("generation", &self.generation)
            .field("publish", &self.publish)
            .field("notify", &self.notify)
            .field("inflight_wait", &self.inflight_wait)
            .finish_non_exhaustive()
    }
}

impl<R, C> RoundController<R, C>
where
    R: TaskRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a controller without evaluation notices.
    #[must_use]
    pub fn new(
        registry: Arc<TaskRegistry<R, C>>,
        guard: AuthorizationGuard,
        generation: GenerationDispatcher,
        publish: PublishDispatcher,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            registry,
            guard,
            generation,
            publish,
            notify: None,
            filter: IdempotencyFilter::new(settings.replay_retention),
            readme: ReadmeRenderer,
            inflight_wait: settings.inflight_wait,
        }
    }

    /// Announces published rounds through `notify`.
    #[must_use]
    pub fn with_notifier(mut self, notify: NotifyDispatcher) -> Self {
        self.notify = Some(notify);
        self
    }

    /// Returns the registry the controller records rounds in.
    #[must_use]
    pub const fn registry(&self) -> &Arc<TaskRegistry<R, C>> {
        &self.registry
    }

    /// Builds round one of a new task, or returns the outcome of an
    /// identical earlier build.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::Unauthorized`], a validation error, or
    /// the failure of the round pipeline.
    pub async fn build(&self, request: BuildRequest) -> RoundOutcome {
        self.guard.authorize(&request.secret)?;
        let owner = optional_identity(request.identity.as_deref())?;
        let template = self.registry.catalog().resolve(&request.task_template)?;
        let brief = request.brief.trim();
        if brief.is_empty() {
            return Err(TaskDomainError::EmptyBrief.into());
        }

        let new_task = NewTask {
            owner,
            template,
            brief: brief.to_owned(),
            checks: request.checks,
            evaluation_url: request.evaluation_url,
        };
        let (task, _created) = self.registry.create_task(&new_task).await?;
        self.submit(task.id(), RoundNumber::FIRST, new_task.first_round())
            .await
    }

    /// Opens (or replays) a revision round of an existing task.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::Unauthorized`],
    /// [`OrchestrationError::NotTaskOwner`], a validation or admission error,
    /// or the failure of the round pipeline.
    pub async fn revise(&self, request: ReviseRequest) -> RoundOutcome {
        self.guard.authorize(&request.secret)?;
        let identity = Identity::parse(request.identity.as_str())?;
        let task_id = TaskId::parse(request.task_id.as_str())?;
        let number = RoundNumber::new(request.round)?;
        let raw_nonce = request
            .nonce
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                OrchestrationError::Validation("nonce is required for revisions".to_owned())
            })?;
        let nonce = Nonce::new(raw_nonce)?;
        let brief = request.brief.trim();
        if brief.is_empty() {
            return Err(TaskDomainError::EmptyBrief.into());
        }
        if number.is_first() {
            return Err(TaskDomainError::RoundAlreadyExists {
                task_id,
                round: number,
            }
            .into());
        }

        let task = self.registry.load(&task_id).await?;
        if task.owner().is_some_and(|owner| owner != &identity) {
            return Err(OrchestrationError::NotTaskOwner {
                task_id,
                identity: identity.as_str().to_owned(),
            });
        }

        let spec = RoundSpec {
            brief: brief.to_owned(),
            checks: request.checks,
            nonce,
            evaluation_url: request.evaluation_url,
        };
        self.submit(&task_id, number, spec).await
    }

    /// Returns the status of a round, or of the latest round.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed input,
    /// [`OrchestrationError::TaskNotFound`] or
    /// [`TaskDomainError::UnknownRound`].
    pub async fn results(&self, task_id: &str, round: Option<u32>) -> RoundOutcome {
        let id = TaskId::parse(task_id)?;
        let number = round.map(RoundNumber::new).transpose()?;
        self.registry.get_status(&id, number).await
    }

    /// Lists the tasks owned by `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidIdentity`] or a repository failure.
    pub async fn tasks(&self, identity: &str) -> OrchestrationResult<Vec<TaskSummary>> {
        let owner = Identity::parse(identity)?;
        self.registry.tasks_for_identity(&owner).await
    }

    async fn submit(
        &self,
        task_id: &TaskId,
        number: RoundNumber,
        spec: RoundSpec,
    ) -> RoundOutcome {
        let key = IdempotencyKey::new(task_id.clone(), number, spec.nonce.clone());
        match self.filter.admit(key, &spec.digest())? {
            Admission::Replay(outcome) => {
                tracing::info!(task_id = %task_id, round = %number, "replaying settled round");
                outcome
            }
            Admission::Follow(waiter) => {
                tracing::debug!(
                    task_id = %task_id,
                    round = %number,
                    "waiting for in-flight round"
                );
                waiter.wait(self.inflight_wait).await
            }
            Admission::Lead(ticket) => {
                let controller = self.clone();
                let pipeline = tokio::spawn(async move { controller.lead(ticket, &spec).await });
                pipeline.await.unwrap_or_else(|err| {
                    tracing::error!(
                        task_id = %task_id,
                        round = %number,
                        error = %err,
                        "round pipeline aborted"
                    );
                    Err(OrchestrationError::Interrupted {
                        task_id: task_id.clone(),
                        round: number,
                    })
                })
            }
        }
    }

    async fn lead(&self, ticket: LeaderTicket, spec: &RoundSpec) -> RoundOutcome {
        let task_id = ticket.key().task_id.clone();
        let number = ticket.key().round;
        let (task, admission) = match self.admit(&task_id, number, spec).await {
            Ok(admitted) => admitted,
            Err(err) => {
                ticket.release(Err(err.clone()));
                return Err(err);
            }
        };

        let state = task.round(number).map(Round::state);
        let outcome = match (admission, state) {
            (RoundAdmission::Superseded, _) => replay_superseded(&task, number, &spec.nonce),
            (RoundAdmission::Existing, Some(current)) if current != RoundState::Pending => {
                replay_record(&task, number)
            }
            _ => {
                let span = tracing::info_span!("round", task_id = %task_id, round = %number);
                self.execute(&task, number).instrument(span).await
            }
        };

        if is_replayable(&outcome, number) {
            ticket.settle(outcome.clone());
        } else {
            ticket.release(outcome.clone());
        }
        outcome
    }

    /// Admits the round, first failing it if an earlier pipeline left it
    /// mid-flight.
    ///
    /// Holding the leader ticket means nothing else drives this key, so an
    /// unsettled round past `PENDING` has no pipeline behind it.
    async fn admit(
        &self,
        task_id: &TaskId,
        number: RoundNumber,
        spec: &RoundSpec,
    ) -> OrchestrationResult<(Task, RoundAdmission)> {
        let (task, admission) = self.registry.create_round(task_id, number, spec).await?;
        let stalled = task
            .round(number)
            .map(Round::state)
            .filter(|state| !state.is_settled() && *state != RoundState::Pending);
        let Some(state) = stalled.filter(|_| admission == RoundAdmission::Existing) else {
            return Ok((task, admission));
        };
        tracing::warn!(
            task_id = %task_id,
            round = %number,
            %state,
            "round stalled without a pipeline"
        );
        self.abandon(task_id, number, "round stalled before it settled")
            .await?;
        self.registry.create_round(task_id, number, spec).await
    }

    /// Runs the pipeline, recording a failure for any error that left the
    /// round unsettled.
    async fn execute(&self, task: &Task, number: RoundNumber) -> RoundOutcome {
        let outcome = self.run(task, number).await;
        if let Err(err) = &outcome {
            let recorded = matches!(
                err,
                OrchestrationError::GenerationFailed { .. }
                    | OrchestrationError::PublishFailed { .. }
            );
            if !recorded {
                if let Err(secondary) = self.abandon(task.id(), number, &err.to_string()).await {
                    tracing::error!(
                        error = %err,
                        secondary = %secondary,
                        "could not record round failure"
                    );
                }
            }
        }
        outcome
    }

    async fn abandon(
        &self,
        task_id: &TaskId,
        number: RoundNumber,
        reason: &str,
    ) -> OrchestrationResult<()> {
        let (_, abandoned) = self
            .registry
            .transition(task_id, number, |task, clock| {
                task.abandon(number, reason, clock)
            })
            .await?;
        if abandoned {
            tracing::warn!(reason, "round abandoned");
        }
        Ok(())
    }

    async fn run(&self, task: &Task, number: RoundNumber) -> RoundOutcome {
        let task_id = task.id();
        let round = task
            .round(number)
            .ok_or_else(|| TaskDomainError::UnknownRound {
                task_id: task_id.clone(),
                round: number,
            })?;
        let request = GenerationRequest {
            task_id: task_id.clone(),
            round: number,
            template: task.template().clone(),
            brief: round.brief().to_owned(),
            checks: round.checks().to_vec(),
            prior_artifact: task.prior_source(number).cloned(),
        };

        self.registry
            .transition(task_id, number, |record, clock| {
                record.advance(number, RoundState::Pending, RoundState::Generating, clock)
            })
            .await?;
        tracing::info!(
            attempt = round.attempt(),
            revision_of = request.prior_artifact.is_some(),
            "generation started"
        );

        let bundle = match self.generation.dispatch(&request).await {
            Ok(generated) => self.readme.attach(generated, &request),
            Err(failure) => {
                let stage = FailureStage::Generation;
                return self
                    .fail(task_id, number, RoundState::Generating, stage, failure)
                    .await;
            }
        };

        self.registry
            .transition(task_id, number, |record, clock| {
                record.record_generated(number, bundle.clone(), clock)
            })
            .await?;
        let (publishing, ()) = self
            .registry
            .transition(task_id, number, |record, clock| {
                record.advance(number, RoundState::Generated, RoundState::Publishing, clock)
            })
            .await?;
        tracing::info!(files = bundle.len(), "publishing started");

        let target = PublishTarget {
            task_id: task_id.clone(),
            round: number,
            live_artifact_url: publishing.live_artifact_url().map(str::to_owned),
        };
        let receipt = match self.publish.dispatch(&target, &bundle).await {
            Ok(published) => published,
            Err(failure) => {
                let stage = FailureStage::Publish;
                return self
                    .fail(task_id, number, RoundState::Publishing, stage, failure)
                    .await;
            }
        };

        let correlation_token = Uuid::new_v4().simple().to_string();
        let (published, ()) = self
            .registry
            .transition(task_id, number, |record, clock| {
                record.record_published(
                    number,
                    receipt.clone(),
                    correlation_token.clone(),
                    clock,
                )
            })
            .await?;
        tracing::info!(artifact_url = %receipt.artifact_url, "round published");

        self.announce(&published, number);
        replay_record(&published, number)
    }

    async fn fail(
        &self,
        task_id: &TaskId,
        number: RoundNumber,
        from: RoundState,
        stage: FailureStage,
        failure: DispatchFailure,
    ) -> RoundOutcome {
        let DispatchFailure {
            attempts,
            reason,
            partial_artifact_url,
        } = failure;
        let record = RoundFailure {
            stage,
            reason,
            partial_artifact_url,
        };
        self.registry
            .transition(task_id, number, |task, clock| {
                task.record_failure(number, from, record.clone(), clock)
            })
            .await?;
        tracing::warn!(
            stage = ?stage,
            attempts,
            reason = %record.reason,
            "round failed"
        );
        Err(OrchestrationError::from_failure(task_id.clone(), number, &record))
    }

    fn announce(&self, task: &Task, number: RoundNumber) {
        let Some(notify) = self.notify.clone() else {
            return;
        };
        let Some(round) = task.round(number) else {
            return;
        };
        let (Some(endpoint), Some(artifact_url), Some(token)) = (
            round.evaluation_url(),
            round.artifact_url(),
            round.correlation_token(),
        ) else {
            tracing::debug!("no evaluation endpoint for round");
            return;
        };

        let notice = EvaluationNotice {
            identity: task.owner().cloned(),
            task_id: task.id().clone(),
            round: number,
            nonce: round.nonce().clone(),
            artifact_url: artifact_url.to_owned(),
            revision: round.revision().map(str::to_owned),
            correlation_token: token.to_owned(),
        };
        let target = endpoint.to_owned();
        tokio::spawn(async move {
            match notify.dispatch(&target, &notice).await {
                Ok(()) => tracing::info!(
                    task_id = %notice.task_id,
                    round = %notice.round,
                    "evaluation notice delivered"
                ),
                Err(failure) => tracing::warn!(
                    task_id = %notice.task_id,
                    round = %notice.round,
                    attempts = failure.attempts,
                    reason = %failure.reason,
                    "evaluation notice undelivered"
                ),
            }
        });
    }
}

/// Rebuilds the outcome a round settled with from its record.
fn replay_record(task: &Task, number: RoundNumber) -> RoundOutcome {
    let round = task
        .round(number)
        .ok_or_else(|| TaskDomainError::UnknownRound {
            task_id: task.id().clone(),
            round: number,
        })?;
    match (round.state(), round.failure()) {
        (RoundState::Failed, Some(failure)) => Err(OrchestrationError::from_failure(
            task.id().clone(),
            number,
            failure,
        )),
        (state, _) if state.is_settled() => Ok(RoundView::of(task, round)),
        _ => Err(OrchestrationError::StillProcessing {
            task_id: task.id().clone(),
            round: number,
        }),
    }
}

/// Rebuilds the failure of an attempt a later nonce replaced.
fn replay_superseded(task: &Task, number: RoundNumber, nonce: &Nonce) -> RoundOutcome {
    let earlier = task
        .round(number)
        .and_then(|round| round.earlier_attempt(nonce))
        .ok_or_else(|| TaskDomainError::UnknownRound {
            task_id: task.id().clone(),
            round: number,
        })?;
    Err(OrchestrationError::from_failure(
        task.id().clone(),
        number,
        &earlier.failure,
    ))
}

/// Returns `true` when later callers with the same key get this outcome.
///
/// A failed round one is not kept: resubmitting the build restarts it.
const fn is_replayable(outcome: &RoundOutcome, number: RoundNumber) -> bool {
    match outcome {
        Ok(_) => true,
        Err(
            OrchestrationError::GenerationFailed { .. } | OrchestrationError::PublishFailed { .. },
        ) => !number.is_first(),
        Err(_) => false,
    }
}

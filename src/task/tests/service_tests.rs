//! Service orchestration tests for build, revise and evaluation flows.

use std::sync::Arc;
use std::time::Duration;

use crate::task::{
    adapters::memory::{
        InMemoryGenerator, InMemoryNotifier, InMemoryPublisher, InMemoryTaskRepository,
    },
    domain::{
        DispatchStatus, EvaluationOutcome, FailureStage, RoundNumber, RoundState, TaskDomainError,
        Verdict,
    },
    ports::CollaboratorError,
    services::{
        AuthorizationGuard, BuildRequest, ControllerSettings, EvaluationCallback,
        EvaluationReconciler, GenerationDispatcher, NotifyDispatcher, OrchestrationError,
        PublishDispatcher, README_PATH, RetryPolicy, ReviseRequest, RoundController,
        SharedSecret, TaskRegistry, TemplateCatalog,
    },
};
use mockable::DefaultClock;
use rstest::{fixture, rstest};

const SECRET: &str = "s3cret";
const OWNER: &str = "ada@example.com";
const PAGES: &str = "https://pages.example";

type TestController = RoundController<InMemoryTaskRepository, DefaultClock>;
type TestReconciler = EvaluationReconciler<InMemoryTaskRepository, DefaultClock>;

struct Harness {
    controller: TestController,
    reconciler: TestReconciler,
    generator: InMemoryGenerator,
    publisher: InMemoryPublisher,
    notifier: InMemoryNotifier,
}

fn policy() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(1), Duration::from_secs(5))
}

fn harness_with(generator: InMemoryGenerator) -> Harness {
    let publisher = InMemoryPublisher::new(PAGES);
    let notifier = InMemoryNotifier::new();
    let registry = Arc::new(TaskRegistry::new(
        Arc::new(InMemoryTaskRepository::new()),
        Arc::new(DefaultClock),
        TemplateCatalog::default(),
    ));
    let controller = RoundController::new(
        Arc::clone(&registry),
        AuthorizationGuard::new(SharedSecret::new(SECRET)),
        GenerationDispatcher::new(Arc::new(generator.clone()), policy()),
        PublishDispatcher::new(Arc::new(publisher.clone()), policy()),
        ControllerSettings::default(),
    )
    .with_notifier(NotifyDispatcher::new(Arc::new(notifier.clone()), policy()));

    Harness {
        controller,
        reconciler: EvaluationReconciler::new(registry),
        generator,
        publisher,
        notifier,
    }
}

#[fixture]
fn harness() -> Harness {
    harness_with(InMemoryGenerator::new())
}

fn build_request(brief: &str) -> BuildRequest {
    BuildRequest {
        identity: Some(OWNER.to_owned()),
        secret: SharedSecret::new(SECRET),
        task_template: "counter".to_owned(),
        brief: brief.to_owned(),
        checks: vec!["shows 0 on load".to_owned()],
        evaluation_url: Some("https://checker.example/notify".to_owned()),
    }
}

fn revise_request(task_id: &str, round: u32, nonce: &str) -> ReviseRequest {
    ReviseRequest {
        identity: OWNER.to_owned(),
        secret: SharedSecret::new(SECRET),
        task_id: task_id.to_owned(),
        round,
        nonce: Some(nonce.to_owned()),
        brief: "Add a reset button".to_owned(),
        checks: vec!["reset sets the counter to 0".to_owned()],
        evaluation_url: None,
    }
}

fn callback(task_id: &str, round: u32, verdict: &str) -> EvaluationCallback {
    EvaluationCallback {
        task_id: task_id.to_owned(),
        round,
        verdict: verdict.to_owned(),
        details: None,
        reported_at: None,
        correlation_token: None,
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn build_publishes_round_one(harness: Harness) {
    let view = harness
        .controller
        .build(build_request("A page with a click counter"))
        .await
        .expect("build should succeed");

    assert_eq!(view.round, RoundNumber::FIRST);
    assert_eq!(view.status, RoundState::Published);
    assert_eq!(view.dispatch_status, DispatchStatus::Published);
    let expected_url = format!("{PAGES}/{}/", view.task_id);
    assert_eq!(view.artifact_url.as_deref(), Some(expected_url.as_str()));

    let live = harness
        .publisher
        .live_bundle(&view.task_id)
        .expect("artifact should be live");
    assert!(live.contains("index.html"));
    assert!(live.contains(README_PATH));

    let status = harness
        .controller
        .results(view.task_id.as_str(), None)
        .await
        .expect("status should load");
    assert_eq!(status, view);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn repeated_build_replays_without_dispatching(harness: Harness) {
    let first = harness
        .controller
        .build(build_request("A page with a click counter"))
        .await
        .expect("build should succeed");
    let second = harness
        .controller
        .build(build_request("A page with a click counter"))
        .await
        .expect("replay should succeed");

    assert_eq!(first, second);
    assert_eq!(harness.generator.calls(), 1);
    assert_eq!(harness.publisher.calls(), 1);
    assert_eq!(harness.publisher.artifact_count(), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn build_announces_published_round(harness: Harness) {
    let view = harness
        .controller
        .build(build_request("A page with a click counter"))
        .await
        .expect("build should succeed");

    let mut delivered = harness.notifier.delivered();
    for _ in 0..50 {
        if !delivered.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        delivered = harness.notifier.delivered();
    }

    let (endpoint, notice) = delivered.first().expect("notice should be delivered");
    assert_eq!(endpoint, "https://checker.example/notify");
    assert_eq!(notice.task_id, view.task_id);
    assert_eq!(Some(notice.artifact_url.as_str()), view.artifact_url.as_deref());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn wrong_secret_is_rejected_before_dispatch(harness: Harness) {
    let mut request = build_request("A page with a click counter");
    request.secret = SharedSecret::new("guess");

    let result = harness.controller.build(request).await;

    assert!(matches!(result, Err(OrchestrationError::Unauthorized)));
    assert_eq!(harness.generator.calls(), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_template_is_rejected(harness: Harness) {
    let mut request = build_request("A page with a click counter");
    request.task_template = "spreadsheet".to_owned();

    let result = harness.controller.build(request).await;

    assert!(matches!(
        result,
        Err(OrchestrationError::Domain(TaskDomainError::InvalidTemplate(_)))
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn revise_publishes_next_round_over_the_same_artifact(harness: Harness) {
    let first = harness
        .controller
        .build(build_request("A page with a click counter"))
        .await
        .expect("build should succeed");

    let second = harness
        .controller
        .revise(revise_request(first.task_id.as_str(), 2, "n-2"))
        .await
        .expect("revise should succeed");

    assert_eq!(second.round, RoundNumber::FIRST.next());
    assert_eq!(second.status, RoundState::Published);
    assert_eq!(second.artifact_url, first.artifact_url);
    assert_eq!(harness.publisher.artifact_count(), 1);

    let summaries = harness
        .controller
        .tasks(OWNER)
        .await
        .expect("listing should succeed");
    assert_eq!(summaries.len(), 1);
    assert_eq!(
        summaries.first().map(|summary| summary.latest_round),
        Some(second.round)
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_duplicate_revisions_dispatch_once() {
    let harness = harness_with(InMemoryGenerator::new().with_latency(Duration::from_millis(50)));
    let first = harness
        .controller
        .build(build_request("A page with a click counter"))
        .await
        .expect("build should succeed");
    let task_id = first.task_id.as_str();

    let (left, right) = tokio::join!(
        harness.controller.revise(revise_request(task_id, 2, "n-2")),
        harness.controller.revise(revise_request(task_id, 2, "n-2")),
    );

    let left = left.expect("leader should succeed");
    let right = right.expect("follower should receive the leader's outcome");
    assert_eq!(left, right);
    assert_eq!(harness.generator.calls(), 2);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn reused_nonce_with_new_brief_is_rejected(harness: Harness) {
    let first = harness
        .controller
        .build(build_request("A page with a click counter"))
        .await
        .expect("build should succeed");
    harness
        .controller
        .revise(revise_request(first.task_id.as_str(), 2, "n-2"))
        .await
        .expect("revise should succeed");

    let mut changed = revise_request(first.task_id.as_str(), 2, "n-2");
    changed.brief = "Add a dark theme".to_owned();
    let result = harness.controller.revise(changed).await;

    assert!(matches!(
        result,
        Err(OrchestrationError::Domain(TaskDomainError::DuplicateNonce { .. }))
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn revise_by_another_identity_is_rejected(harness: Harness) {
    let first = harness
        .controller
        .build(build_request("A page with a click counter"))
        .await
        .expect("build should succeed");

    let mut request = revise_request(first.task_id.as_str(), 2, "n-2");
    request.identity = "mallory@example.com".to_owned();
    let result = harness.controller.revise(request).await;

    assert!(matches!(result, Err(OrchestrationError::NotTaskOwner { .. })));
    assert_eq!(harness.generator.calls(), 1);
}

#[rstest]
#[case(None)]
#[case(Some("   "))]
#[tokio::test(flavor = "multi_thread")]
async fn revise_requires_a_nonce(harness: Harness, #[case] nonce: Option<&str>) {
    let first = harness
        .controller
        .build(build_request("A page with a click counter"))
        .await
        .expect("build should succeed");

    let mut request = revise_request(first.task_id.as_str(), 2, "unused");
    request.nonce = nonce.map(str::to_owned);
    let result = harness.controller.revise(request).await;

    assert!(result.is_err_and(|err| err.is_validation()));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn revise_cannot_skip_rounds(harness: Harness) {
    let first = harness
        .controller
        .build(build_request("A page with a click counter"))
        .await
        .expect("build should succeed");

    let result = harness
        .controller
        .revise(revise_request(first.task_id.as_str(), 3, "n-3"))
        .await;

    assert!(matches!(
        result,
        Err(OrchestrationError::Domain(
            TaskDomainError::InvalidRoundNumber { .. }
        ))
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn revise_of_unknown_task_is_not_found(harness: Harness) {
    let result = harness
        .controller
        .revise(revise_request("counter-00000000", 2, "n-2"))
        .await;

    assert!(matches!(result, Err(OrchestrationError::TaskNotFound(_))));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn generation_failure_is_recorded_and_retried_with_new_nonce(harness: Harness) {
    let first = harness
        .controller
        .build(build_request("A page with a click counter"))
        .await
        .expect("build should succeed");
    let task_id = first.task_id.as_str();
    harness
        .generator
        .fail_next(CollaboratorError::Rejected("quota exhausted".to_owned()))
        .expect("failure should queue");

    let failed = harness
        .controller
        .revise(revise_request(task_id, 2, "n-2"))
        .await;
    assert!(matches!(
        failed,
        Err(OrchestrationError::GenerationFailed { .. })
    ));

    let status = harness
        .controller
        .results(task_id, Some(2))
        .await
        .expect("status should load");
    assert_eq!(status.status, RoundState::Failed);
    assert_eq!(
        status.failure.as_ref().map(|failure| failure.stage),
        Some(FailureStage::Generation)
    );

    let replayed = harness
        .controller
        .revise(revise_request(task_id, 2, "n-2"))
        .await;
    assert_eq!(
        replayed.err().map(|err| err.to_string()),
        failed.err().map(|err| err.to_string())
    );

    let retried = harness
        .controller
        .revise(revise_request(task_id, 2, "n-2b"))
        .await
        .expect("retry under a new nonce should succeed");
    assert_eq!(retried.status, RoundState::Published);
    assert_eq!(retried.attempt, 2);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_first_round_restarts_on_resubmitted_build(harness: Harness) {
    harness
        .generator
        .fail_next(CollaboratorError::Rejected("quota exhausted".to_owned()))
        .expect("failure should queue");

    let failed = harness
        .controller
        .build(build_request("A page with a click counter"))
        .await;
    assert!(matches!(
        failed,
        Err(OrchestrationError::GenerationFailed { .. })
    ));

    let rebuilt = harness
        .controller
        .build(build_request("A page with a click counter"))
        .await
        .expect("resubmitted build should succeed");
    assert_eq!(rebuilt.status, RoundState::Published);
    assert_eq!(rebuilt.attempt, 2);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn evaluation_callbacks_reconcile_with_the_round(harness: Harness) {
    let view = harness
        .controller
        .build(build_request("A page with a click counter"))
        .await
        .expect("build should succeed");
    let task_id = view.task_id.as_str();

    let recorded = harness
        .reconciler
        .reconcile(&callback(task_id, 1, "pass"))
        .await
        .expect("first verdict should record");
    let repeated = harness
        .reconciler
        .reconcile(&callback(task_id, 1, "PASS"))
        .await
        .expect("repeat verdict should reconcile");

    assert_eq!(recorded, EvaluationOutcome::Recorded);
    assert_eq!(repeated, EvaluationOutcome::Unchanged);
    let status = harness
        .controller
        .results(task_id, Some(1))
        .await
        .expect("status should load");
    assert_eq!(status.status, RoundState::Evaluated);
    assert_eq!(
        status.evaluation.map(|evaluation| evaluation.verdict),
        Some(Verdict::Pass)
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn callbacks_for_unpublished_or_unknown_rounds_are_acknowledged_but_rejected(
    harness: Harness,
) {
    let view = harness
        .controller
        .build(build_request("A page with a click counter"))
        .await
        .expect("build should succeed");
    let task_id = view.task_id.as_str();

    let unknown_round = harness.reconciler.receive(&callback(task_id, 2, "pass")).await;
    let unknown_task = harness
        .reconciler
        .receive(&callback("counter-00000000", 1, "pass"))
        .await;
    let bad_verdict = harness.reconciler.receive(&callback(task_id, 1, "maybe")).await;

    assert!(!unknown_round.accepted);
    assert!(!unknown_task.accepted);
    assert!(!bad_verdict.accepted);

    let mut forged = callback(task_id, 1, "pass");
    forged.correlation_token = Some("forged".to_owned());
    let result = harness.reconciler.reconcile(&forged).await;
    assert!(matches!(
        result,
        Err(OrchestrationError::Domain(
            TaskDomainError::CorrelationMismatch { .. }
        ))
    ));
}

//! Build, revise, replay and failure flows against in-memory adapters.

use std::time::Duration;

use pagewright::task::{
    adapters::memory::{InMemoryGenerator, InMemoryPublisher},
    domain::{DispatchStatus, RoundState},
    ports::CollaboratorError,
    services::OrchestrationError,
};
use rstest::rstest;

use super::helpers::{Deployment, OWNER, PAGES, build, deployment, revise};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn three_rounds_revise_one_live_artifact(deployment: Deployment) {
    let first = deployment
        .controller
        .build(build("A todo list"))
        .await
        .expect("build should succeed");
    let task_id = first.task_id.as_str();

    let second = deployment
        .controller
        .revise(revise(task_id, 2, "r2", "Add due dates"))
        .await
        .expect("round two should succeed");
    let third = deployment
        .controller
        .revise(revise(task_id, 3, "r3", "Add a dark theme"))
        .await
        .expect("round three should succeed");

    assert_eq!(second.artifact_url, first.artifact_url);
    assert_eq!(third.artifact_url, first.artifact_url);
    assert_eq!(deployment.publisher.artifact_count(), 1);
    assert_eq!(deployment.repository.len(), 1);

    let live = deployment
        .publisher
        .live_bundle(&first.task_id)
        .expect("artifact should be live");
    let page = live.file("index.html").expect("page should exist");
    assert!(page.contains("Add a dark theme"));
    let readme = live.file("README.md").expect("README should exist");
    assert!(readme.contains("round 3"));

    let listed = deployment
        .controller
        .tasks(OWNER)
        .await
        .expect("listing should succeed");
    let summary = listed.first().expect("one task should be listed");
    assert_eq!(summary.latest_round, third.round);
    assert_eq!(summary.status, RoundState::Published);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn historical_rounds_remain_queryable(deployment: Deployment) {
    let first = deployment
        .controller
        .build(build("A todo list"))
        .await
        .expect("build should succeed");
    let task_id = first.task_id.as_str();
    deployment
        .controller
        .revise(revise(task_id, 2, "r2", "Add due dates"))
        .await
        .expect("round two should succeed");

    let round_one = deployment
        .controller
        .results(task_id, Some(1))
        .await
        .expect("round one should be queryable");
    let latest = deployment
        .controller
        .results(task_id, None)
        .await
        .expect("latest round should be queryable");

    assert_eq!(round_one.brief, "A todo list");
    assert_eq!(latest.brief, "Add due dates");
    assert_eq!(latest.dispatch_status, DispatchStatus::Published);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn transient_failures_are_retried_within_one_request(deployment: Deployment) {
    deployment
        .generator
        .fail_next(CollaboratorError::Network("connection reset".to_owned()))
        .expect("failure should queue");
    deployment
        .publisher
        .fail_next(CollaboratorError::Upstream {
            status: 503,
            message: "busy".to_owned(),
        })
        .expect("failure should queue");

    let view = deployment
        .controller
        .build(build("A todo list"))
        .await
        .expect("retries should recover");

    assert_eq!(view.status, RoundState::Published);
    assert_eq!(deployment.generator.calls(), 2);
    assert_eq!(deployment.publisher.calls(), 2);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn partial_publish_is_recorded_with_its_url(deployment: Deployment) {
    let first = deployment
        .controller
        .build(build("A todo list"))
        .await
        .expect("build should succeed");
    let partial = format!("{PAGES}/{}/", first.task_id);
    deployment
        .publisher
        .fail_next(CollaboratorError::PartialPublish {
            artifact_url: partial.clone(),
            reason: "metadata update failed".to_owned(),
        })
        .expect("failure should queue");

    let result = deployment
        .controller
        .revise(revise(first.task_id.as_str(), 2, "r2", "Add due dates"))
        .await;

    let Err(OrchestrationError::PublishFailed {
        partial_artifact_url,
        ..
    }) = result
    else {
        panic!("expected PublishFailed, got {result:?}");
    };
    assert_eq!(partial_artifact_url.as_deref(), Some(partial.as_str()));
    assert_eq!(deployment.publisher.calls(), 2);

    let status = deployment
        .controller
        .results(first.task_id.as_str(), Some(2))
        .await
        .expect("status should load");
    assert_eq!(status.status, RoundState::Failed);
    assert_eq!(status.dispatch_status, DispatchStatus::Failed);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn duplicate_during_processing_waits_for_the_original() {
    let deployment = Deployment::with_collaborators(
        InMemoryGenerator::new().with_latency(Duration::from_millis(100)),
        InMemoryPublisher::new(PAGES),
    );

    let (left, right) = tokio::join!(
        deployment.controller.build(build("A todo list")),
        deployment.controller.build(build("A todo list")),
    );

    let left = left.expect("original should succeed");
    let right = right.expect("duplicate should receive the original outcome");
    assert_eq!(left, right);
    assert_eq!(deployment.generator.calls(), 1);
    assert_eq!(deployment.repository.len(), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn anonymous_builds_accept_revisions_from_any_identity(deployment: Deployment) {
    let mut request = build("A todo list");
    request.identity = None;
    let first = deployment
        .controller
        .build(request)
        .await
        .expect("anonymous build should succeed");

    let second = deployment
        .controller
        .revise(revise(first.task_id.as_str(), 2, "r2", "Add due dates"))
        .await
        .expect("revision should succeed");

    assert_eq!(second.status, RoundState::Published);
}

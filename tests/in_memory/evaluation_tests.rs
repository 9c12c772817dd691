//! Checker notices and evaluation callbacks.

use pagewright::task::{
    domain::{EvaluationOutcome, RoundState, Verdict},
    services::EvaluationCallback,
};
use rstest::rstest;

use super::helpers::{CHECKER, Deployment, build, deployment, revise};

fn verdict(task_id: &str, round: u32, verdict: &str, reported_at: &str) -> EvaluationCallback {
    EvaluationCallback {
        task_id: task_id.to_owned(),
        round,
        verdict: verdict.to_owned(),
        details: Some(serde_json::json!({ "failed_checks": [] })),
        reported_at: Some(reported_at.parse().expect("valid timestamp")),
        correlation_token: None,
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn every_published_round_is_announced(deployment: Deployment) {
    let first = deployment
        .controller
        .build(build("A todo list"))
        .await
        .expect("build should succeed");
    deployment
        .controller
        .revise(revise(first.task_id.as_str(), 2, "r2", "Add due dates"))
        .await
        .expect("revision should succeed");

    assert_eq!(deployment.await_notices(2).await, 2);
    let delivered = deployment.notifier.delivered();
    assert!(delivered.iter().all(|(endpoint, _)| endpoint == CHECKER));
    let mut rounds: Vec<u32> = delivered
        .iter()
        .map(|(_, notice)| notice.round.value())
        .collect();
    rounds.sort_unstable();
    assert_eq!(rounds, vec![1, 2]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn echoed_correlation_token_is_accepted(deployment: Deployment) {
    let first = deployment
        .controller
        .build(build("A todo list"))
        .await
        .expect("build should succeed");
    assert_eq!(deployment.await_notices(1).await, 1);
    let (_, notice) = deployment
        .notifier
        .delivered()
        .into_iter()
        .next()
        .expect("notice should be delivered");

    let mut callback = verdict(first.task_id.as_str(), 1, "pass", "2026-05-01T10:00:00Z");
    callback.correlation_token = Some(notice.correlation_token);
    let ack = deployment.reconciler.receive(&callback).await;

    assert!(ack.accepted);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn later_verdict_supersedes_and_keeps_history(deployment: Deployment) {
    let first = deployment
        .controller
        .build(build("A todo list"))
        .await
        .expect("build should succeed");
    let task_id = first.task_id.as_str();

    let initial = deployment
        .reconciler
        .reconcile(&verdict(task_id, 1, "fail", "2026-05-01T10:00:00Z"))
        .await
        .expect("first verdict should record");
    let later = deployment
        .reconciler
        .reconcile(&verdict(task_id, 1, "pass", "2026-05-01T11:00:00Z"))
        .await
        .expect("later verdict should reconcile");
    let stale = deployment
        .reconciler
        .reconcile(&verdict(task_id, 1, "partial", "2026-05-01T09:00:00Z"))
        .await
        .expect("stale verdict should reconcile");

    assert_eq!(initial, EvaluationOutcome::Recorded);
    assert_eq!(later, EvaluationOutcome::Superseded { previous: Verdict::Fail });
    assert_eq!(stale, EvaluationOutcome::Stale { current: Verdict::Pass });

    let status = deployment
        .controller
        .results(task_id, Some(1))
        .await
        .expect("status should load");
    assert_eq!(status.status, RoundState::Evaluated);
    assert_eq!(
        status.evaluation.map(|evaluation| evaluation.verdict),
        Some(Verdict::Pass)
    );
    let history: Vec<Verdict> = status
        .evaluation_history
        .iter()
        .map(|evaluation| evaluation.verdict)
        .collect();
    assert_eq!(history, vec![Verdict::Fail, Verdict::Partial]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn evaluated_round_still_opens_the_next_round(deployment: Deployment) {
    let first = deployment
        .controller
        .build(build("A todo list"))
        .await
        .expect("build should succeed");
    let task_id = first.task_id.as_str();
    deployment
        .reconciler
        .reconcile(&verdict(task_id, 1, "pass", "2026-05-01T10:00:00Z"))
        .await
        .expect("verdict should record");

    let second = deployment
        .controller
        .revise(revise(task_id, 2, "r2", "Add due dates"))
        .await
        .expect("revision after evaluation should succeed");

    assert_eq!(second.status, RoundState::Published);
}

//! When steps for round lifecycle BDD scenarios.

use super::world::{RoundLifecycleWorld, build_request, revise_request, run_async};
use pagewright::task::services::EvaluationCallback;
use rstest_bdd_macros::when;

#[when(r#""{identity}" builds a "{template}" with brief "{brief}""#)]
fn builds(world: &mut RoundLifecycleWorld, identity: String, template: String, brief: String) {
    let result = run_async(
        world
            .controller
            .build(build_request(identity, template, brief)),
    );
    if let Ok(ref view) = result {
        world.task_id = Some(view.task_id.as_str().to_owned());
    }
    world.last_result = Some(result);
}

#[when(r#""{identity}" revises round {round:u32} with nonce "{nonce}" and brief "{brief}""#)]
fn revises(
    world: &mut RoundLifecycleWorld,
    identity: String,
    round: u32,
    nonce: String,
    brief: String,
) -> Result<(), eyre::Report> {
    let task_id = world.task_id()?;
    let result = run_async(
        world
            .controller
            .revise(revise_request(identity, task_id, round, nonce, brief)),
    );
    world.last_result = Some(result);
    Ok(())
}

#[when(r#"the checker reports "{verdict}" for round {round:u32}"#)]
fn checker_reports(
    world: &mut RoundLifecycleWorld,
    verdict: String,
    round: u32,
) -> Result<(), eyre::Report> {
    let callback = EvaluationCallback {
        task_id: world.task_id()?,
        round,
        verdict,
        details: None,
        reported_at: None,
        correlation_token: None,
    };
    world.last_ack = Some(run_async(world.reconciler.receive(&callback)));
    Ok(())
}

//! Then steps for round lifecycle BDD scenarios.

use super::world::{RoundLifecycleWorld, run_async};
use pagewright::task::{
    domain::{RoundState, TaskDomainError},
    services::OrchestrationError,
};
use rstest_bdd_macros::then;

#[then(r#"round {round:u32} is "{state}""#)]
fn round_is(world: &RoundLifecycleWorld, round: u32, state: String) -> Result<(), eyre::Report> {
    let expected = RoundState::try_from(state.as_str())
        .map_err(|err| eyre::eyre!("invalid expected state in scenario: {err}"))?;
    let task_id = world.task_id()?;
    let view = run_async(world.controller.results(&task_id, Some(round)))
        .map_err(|err| eyre::eyre!("status query failed: {err}"))?;

    eyre::ensure!(
        view.status == expected,
        "expected round {round} to be {expected}, found {}",
        view.status
    );
    Ok(())
}

#[then("round {later:u32} shares the artifact of round {earlier:u32}")]
fn shares_artifact(
    world: &RoundLifecycleWorld,
    later: u32,
    earlier: u32,
) -> Result<(), eyre::Report> {
    let task_id = world.task_id()?;
    let newer = run_async(world.controller.results(&task_id, Some(later)))
        .map_err(|err| eyre::eyre!("status query failed: {err}"))?;
    let older = run_async(world.controller.results(&task_id, Some(earlier)))
        .map_err(|err| eyre::eyre!("status query failed: {err}"))?;

    eyre::ensure!(newer.artifact_url.is_some(), "round {later} has no artifact");
    eyre::ensure!(
        newer.artifact_url == older.artifact_url,
        "artifact moved from {:?} to {:?}",
        older.artifact_url,
        newer.artifact_url
    );
    Ok(())
}

#[then("the generator was called {count:usize} times")]
fn generator_calls(world: &RoundLifecycleWorld, count: usize) -> Result<(), eyre::Report> {
    let calls = world.generator.calls();
    eyre::ensure!(calls == count, "expected {count} generator calls, found {calls}");
    Ok(())
}

#[then("the request fails with an invalid round number error")]
fn fails_with_invalid_round(world: &RoundLifecycleWorld) -> Result<(), eyre::Report> {
    let result = world
        .last_result
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing request result"))?;

    if !matches!(
        result,
        Err(OrchestrationError::Domain(
            TaskDomainError::InvalidRoundNumber { .. }
        ))
    ) {
        return Err(eyre::eyre!("expected InvalidRoundNumber error, got {result:?}"));
    }
    Ok(())
}

#[then("the request fails with a generation error")]
fn fails_with_generation_error(world: &RoundLifecycleWorld) -> Result<(), eyre::Report> {
    let result = world
        .last_result
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing request result"))?;

    if !matches!(result, Err(OrchestrationError::GenerationFailed { .. })) {
        return Err(eyre::eyre!("expected GenerationFailed error, got {result:?}"));
    }
    Ok(())
}

#[then("the callback is accepted")]
fn callback_accepted(world: &RoundLifecycleWorld) -> Result<(), eyre::Report> {
    let ack = world
        .last_ack
        .ok_or_else(|| eyre::eyre!("missing callback acknowledgement"))?;
    eyre::ensure!(ack.accepted, "callback was rejected");
    Ok(())
}

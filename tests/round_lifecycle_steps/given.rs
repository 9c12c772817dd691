//! Given steps for round lifecycle BDD scenarios.

use super::world::{RoundLifecycleWorld, build_request, revise_request, run_async};
use eyre::WrapErr;
use pagewright::task::ports::CollaboratorError;
use rstest_bdd_macros::given;

#[given(r#""{identity}" has built a "{template}" with brief "{brief}""#)]
fn has_built(
    world: &mut RoundLifecycleWorld,
    identity: String,
    template: String,
    brief: String,
) -> Result<(), eyre::Report> {
    let view = run_async(
        world
            .controller
            .build(build_request(identity, template, brief)),
    )
    .wrap_err("build task in scenario setup")?;
    world.task_id = Some(view.task_id.as_str().to_owned());
    Ok(())
}

#[given(r#""{identity}" has revised round {round:u32} with nonce "{nonce}" and brief "{brief}""#)]
fn has_revised(
    world: &mut RoundLifecycleWorld,
    identity: String,
    round: u32,
    nonce: String,
    brief: String,
) -> Result<(), eyre::Report> {
    let task_id = world.task_id()?;
    run_async(
        world
            .controller
            .revise(revise_request(identity, task_id, round, nonce, brief)),
    )
    .wrap_err("revise task in scenario setup")?;
    Ok(())
}

#[given("the generator will fail on its next call")]
fn generator_will_fail(world: &mut RoundLifecycleWorld) -> Result<(), eyre::Report> {
    world
        .generator
        .fail_next(CollaboratorError::Rejected("model unavailable".to_owned()))
        .wrap_err("queue generator failure")
}

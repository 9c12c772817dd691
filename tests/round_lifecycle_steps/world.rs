//! Shared world state for round lifecycle BDD scenarios.

use std::sync::Arc;
use std::time::Duration;

use mockable::DefaultClock;
use pagewright::task::{
    adapters::memory::{InMemoryGenerator, InMemoryPublisher, InMemoryTaskRepository},
    services::{
        Ack, AuthorizationGuard, BuildRequest, ControllerSettings, EvaluationReconciler,
        GenerationDispatcher, PublishDispatcher, RetryPolicy, ReviseRequest, RoundController,
        RoundOutcome, SharedSecret, TaskRegistry, TemplateCatalog,
    },
};
use rstest::fixture;

/// Secret shared by every scenario request.
pub const SECRET: &str = "scenario-secret";

/// Controller type used by the BDD world.
pub type TestController = RoundController<InMemoryTaskRepository, DefaultClock>;

/// Scenario world for round lifecycle behaviour tests.
pub struct RoundLifecycleWorld {
    pub controller: TestController,
    pub reconciler: EvaluationReconciler<InMemoryTaskRepository, DefaultClock>,
    pub generator: InMemoryGenerator,
    pub task_id: Option<String>,
    pub last_result: Option<RoundOutcome>,
    pub last_ack: Option<Ack>,
}

impl RoundLifecycleWorld {
    /// Creates a world around fresh in-memory collaborators.
    #[must_use]
    pub fn new() -> Self {
        let generator = InMemoryGenerator::new();
        let policy = RetryPolicy::new(1, Duration::from_millis(1), Duration::from_secs(5));
        let registry = Arc::new(TaskRegistry::new(
            Arc::new(InMemoryTaskRepository::new()),
            Arc::new(DefaultClock),
            TemplateCatalog::default(),
        ));
        let controller = RoundController::new(
            Arc::clone(&registry),
            AuthorizationGuard::new(SharedSecret::new(SECRET)),
            GenerationDispatcher::new(Arc::new(generator.clone()), policy.clone()),
            PublishDispatcher::new(Arc::new(InMemoryPublisher::new("https://pages.test")), policy),
            ControllerSettings::default(),
        );

        Self {
            controller,
            reconciler: EvaluationReconciler::new(registry),
            generator,
            task_id: None,
            last_result: None,
            last_ack: None,
        }
    }

    /// Returns the task created by the scenario.
    ///
    /// # Errors
    ///
    /// Returns an error when no build has run yet.
    pub fn task_id(&self) -> Result<String, eyre::Report> {
        self.task_id
            .clone()
            .ok_or_else(|| eyre::eyre!("missing task id in scenario world"))
    }
}

impl Default for RoundLifecycleWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> RoundLifecycleWorld {
    RoundLifecycleWorld::default()
}

/// Build request for a scenario.
#[must_use]
pub fn build_request(identity: String, template: String, brief: String) -> BuildRequest {
    BuildRequest {
        identity: Some(identity),
        secret: SharedSecret::new(SECRET),
        task_template: template,
        brief,
        checks: Vec::new(),
        evaluation_url: None,
    }
}

/// Revise request for a scenario.
#[must_use]
pub fn revise_request(
    identity: String,
    task_id: String,
    round: u32,
    nonce: String,
    brief: String,
) -> ReviseRequest {
    ReviseRequest {
        identity,
        secret: SharedSecret::new(SECRET),
        task_id,
        round,
        nonce: Some(nonce),
        brief,
        checks: Vec::new(),
        evaluation_url: None,
    }
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

//! Shared fixtures for in-memory integration tests.

use std::sync::Arc;
use std::time::Duration;

use mockable::DefaultClock;
use pagewright::task::{
    adapters::memory::{
        InMemoryGenerator, InMemoryNotifier, InMemoryPublisher, InMemoryTaskRepository,
    },
    services::{
        AuthorizationGuard, BuildRequest, ControllerSettings, EvaluationReconciler,
        GenerationDispatcher, NotifyDispatcher, PublishDispatcher, RetryPolicy, ReviseRequest,
        RoundController, SharedSecret, TaskRegistry, TemplateCatalog,
    },
};
use rstest::fixture;

/// Secret configured for every test deployment.
pub const SECRET: &str = "integration-secret";
/// Owner identity used by default requests.
pub const OWNER: &str = "grace@example.com";
/// Base URL of the in-memory publisher.
pub const PAGES: &str = "https://pages.test";
/// Checker endpoint attached to build requests.
pub const CHECKER: &str = "https://checker.test/notify";

/// Controller type under test.
pub type Controller = RoundController<InMemoryTaskRepository, DefaultClock>;
/// Reconciler type under test.
pub type Reconciler = EvaluationReconciler<InMemoryTaskRepository, DefaultClock>;

/// A wired deployment with handles on every in-memory collaborator.
pub struct Deployment {
    pub controller: Controller,
    pub reconciler: Reconciler,
    pub repository: InMemoryTaskRepository,
    pub generator: InMemoryGenerator,
    pub publisher: InMemoryPublisher,
    pub notifier: InMemoryNotifier,
}

impl Deployment {
    /// Wires a deployment around `generator` and `publisher`.
    #[must_use]
    pub fn with_collaborators(generator: InMemoryGenerator, publisher: InMemoryPublisher) -> Self {
        let repository = InMemoryTaskRepository::new();
        let notifier = InMemoryNotifier::new();
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_secs(5));
        let registry = Arc::new(TaskRegistry::new(
            Arc::new(repository.clone()),
            Arc::new(DefaultClock),
            TemplateCatalog::default(),
        ));
        let controller = RoundController::new(
            Arc::clone(&registry),
            AuthorizationGuard::new(SharedSecret::new(SECRET)),
            GenerationDispatcher::new(Arc::new(generator.clone()), policy.clone()),
            PublishDispatcher::new(Arc::new(publisher.clone()), policy.clone()),
            ControllerSettings {
                inflight_wait: Duration::from_secs(5),
                replay_retention: None,
            },
        )
        .with_notifier(NotifyDispatcher::new(Arc::new(notifier.clone()), policy));

        Self {
            controller,
            reconciler: EvaluationReconciler::new(registry),
            repository,
            generator,
            publisher,
            notifier,
        }
    }

    /// Waits until `count` notices were delivered or a second has passed.
    pub async fn await_notices(&self, count: usize) -> usize {
        for _ in 0..100 {
            let delivered = self.notifier.delivered().len();
            if delivered >= count {
                return delivered;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.notifier.delivered().len()
    }
}

/// Fresh deployment with immediate collaborators.
#[fixture]
pub fn deployment() -> Deployment {
    Deployment::with_collaborators(InMemoryGenerator::new(), InMemoryPublisher::new(PAGES))
}

/// Build request for `brief` from [`OWNER`].
#[must_use]
pub fn build(brief: &str) -> BuildRequest {
    BuildRequest {
        identity: Some(OWNER.to_owned()),
        secret: SharedSecret::new(SECRET),
        task_template: "todo-list".to_owned(),
        brief: brief.to_owned(),
        checks: vec!["lists added items".to_owned()],
        evaluation_url: Some(CHECKER.to_owned()),
    }
}

/// Revise request for `round` of `task_id` under `nonce`.
#[must_use]
pub fn revise(task_id: &str, round: u32, nonce: &str, brief: &str) -> ReviseRequest {
    ReviseRequest {
        identity: OWNER.to_owned(),
        secret: SharedSecret::new(SECRET),
        task_id: task_id.to_owned(),
        round,
        nonce: Some(nonce.to_owned()),
        brief: brief.to_owned(),
        checks: Vec::new(),
        evaluation_url: Some(CHECKER.to_owned()),
    }
}

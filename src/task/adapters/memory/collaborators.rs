//! In-process stand-ins for the generation, hosting and checker
//! collaborators.
//!
//! These adapters model collaborator behaviour without network calls. They
//! serve local runs and tests, and can be scripted to fail or to respond
//! slowly.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use minijinja::{Environment, context};

use crate::task::{
    domain::{PublishReceipt, SourceBundle, TaskId},
    ports::{
        ArtifactPublisher, CodeGenerator, CollaboratorError, EvaluationNotice,
        EvaluationNotifier, GenerationRequest, PublishTarget,
    },
};

const PAGE_TEMPLATE: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>{{ task_id }}</title></head>
<body>
<main data-task="{{ task_id }}" data-round="{{ round }}">
<h1>{{ template }}</h1>
<p>{{ brief }}</p>
{% if checks %}<ul>{% for check in checks %}<li>{{ check }}</li>{% endfor %}</ul>{% endif %}
</main>
</body>
</html>
"#;

fn poisoned(err: impl std::fmt::Display) -> CollaboratorError {
    CollaboratorError::Rejected(format!("collaborator state poisoned: {err}"))
}

#[derive(Debug, Default)]
struct Script {
    calls: usize,
    failures: VecDeque<CollaboratorError>,
}

impl Script {
    fn next(&mut self) -> Result<(), CollaboratorError> {
        self.calls = self.calls.saturating_add(1);
        self.failures.pop_front().map_or(Ok(()), Err)
    }
}

/// Generator that renders the brief into a single static page.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGenerator {
    script: Arc<RwLock<Script>>,
    latency: Duration,
}

impl InMemoryGenerator {
    /// Creates a generator that answers immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queues a failure returned by the next call.
    ///
    /// # Errors
    ///
    /// Returns an error when the internal lock is poisoned.
    pub fn fail_next(&self, error: CollaboratorError) -> Result<(), CollaboratorError> {
        self.script.write().map_err(poisoned)?.failures.push_back(error);
        Ok(())
    }

    /// Returns how many times `generate` was called.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.script.read().map(|script| script.calls).unwrap_or(0)
    }
}

#[async_trait]
impl CodeGenerator for InMemoryGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<SourceBundle, CollaboratorError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.script.write().map_err(poisoned)?.next()?;

        let page = Environment::new()
            .render_str(
                PAGE_TEMPLATE,
                context! {
                    task_id => request.task_id.as_str(),
                    round => request.round.value(),
                    template => request.template.as_str(),
                    brief => &request.brief,
                    checks => &request.checks,
                },
            )
            .map_err(|err| CollaboratorError::Rejected(err.to_string()))?;

        let bundle = request
            .prior_artifact
            .clone()
            .unwrap_or_default()
            .with_file("index.html", page);
        Ok(bundle)
    }
}

#[derive(Debug, Clone)]
struct LiveArtifact {
    url: String,
    bundle: SourceBundle,
    revisions: u32,
}

#[derive(Debug, Default)]
struct PublisherState {
    script: Script,
    artifacts: HashMap<TaskId, LiveArtifact>,
}

/// Publisher that keeps one live artifact per task under a base URL.
#[derive(Debug, Clone)]
pub struct InMemoryPublisher {
    state: Arc<RwLock<PublisherState>>,
    base_url: String,
    latency: Duration,
}

impl InMemoryPublisher {
    /// Creates a publisher serving artifacts under `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            state: Arc::new(RwLock::new(PublisherState::default())),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            latency: Duration::ZERO,
        }
    }

    /// Delays every call by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queues a failure returned by the next call.
    ///
    /// # Errors
    ///
    /// Returns an error when the internal lock is poisoned.
    pub fn fail_next(&self, error: CollaboratorError) -> Result<(), CollaboratorError> {
        self.state
            .write()
            .map_err(poisoned)?
            .script
            .failures
            .push_back(error);
        Ok(())
    }

    /// Returns how many times `publish` was called.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.state.read().map(|state| state.script.calls).unwrap_or(0)
    }

    /// Returns the number of distinct live artifacts.
    #[must_use]
    pub fn artifact_count(&self) -> usize {
        self.state.read().map(|state| state.artifacts.len()).unwrap_or(0)
    }

    /// Returns the bundle currently live for a task.
    #[must_use]
    pub fn live_bundle(&self, task_id: &TaskId) -> Option<SourceBundle> {
        self.state
            .read()
            .ok()
            .and_then(|state| state.artifacts.get(task_id).map(|live| live.bundle.clone()))
    }
}

#[async_trait]
impl ArtifactPublisher for InMemoryPublisher {
    async fn publish(
        &self,
        target: &PublishTarget,
        bundle: &SourceBundle,
    ) -> Result<PublishReceipt, CollaboratorError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut state = self.state.write().map_err(poisoned)?;
        state.script.next()?;

        let default_url = format!("{}/{}/", self.base_url, target.task_id);
        let live = state
            .artifacts
            .entry(target.task_id.clone())
            .or_insert_with(|| LiveArtifact {
                url: default_url,
                bundle: SourceBundle::new(),
                revisions: 0,
            });
        live.bundle = bundle.clone();
        live.revisions = live.revisions.saturating_add(1);

        Ok(PublishReceipt::new(live.url.clone())
            .with_revision(format!("{}-r{}", target.task_id, live.revisions)))
    }
}

#[derive(Debug, Default)]
struct NotifierState {
    script: Script,
    delivered: Vec<(String, EvaluationNotice)>,
}

/// Notifier that records delivered notices.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<NotifierState>>,
}

impl InMemoryNotifier {
    /// Creates an empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a failure returned by the next call.
    ///
    /// # Errors
    ///
    /// Returns an error when the internal lock is poisoned.
    pub fn fail_next(&self, error: CollaboratorError) -> Result<(), CollaboratorError> {
        self.state
            .write()
            .map_err(poisoned)?
            .script
            .failures
            .push_back(error);
        Ok(())
    }

    /// Returns delivered `(endpoint, notice)` pairs in delivery order.
    #[must_use]
    pub fn delivered(&self) -> Vec<(String, EvaluationNotice)> {
        self.state
            .read()
            .map(|state| state.delivered.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EvaluationNotifier for InMemoryNotifier {
    async fn notify(
        &self,
        endpoint: &str,
        notice: &EvaluationNotice,
    ) -> Result<(), CollaboratorError> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.script.next()?;
        state.delivered.push((endpoint.to_owned(), notice.clone()));
        Ok(())
    }
}

//! Retrying wrappers around the collaborator ports.

use super::{RetryExhausted, RetryPolicy};
use crate::task::{
    domain::{PublishReceipt, SourceBundle},
    ports::{
        ArtifactPublisher, CodeGenerator, CollaboratorError, EvaluationNotice,
        EvaluationNotifier, GenerationRequest, PublishTarget,
    },
};
use std::fmt;
use std::sync::Arc;

/// Outcome of a dispatch that gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFailure {
    /// Attempts spent.
    pub attempts: u32,
    /// Human-readable reason.
    pub reason: String,
    /// Artifact created before the failure, if any.
    pub partial_artifact_url: Option<String>,
}

impl From<RetryExhausted> for DispatchFailure {
    fn from(exhausted: RetryExhausted) -> Self {
        Self {
            attempts: exhausted.attempts,
            partial_artifact_url: exhausted.error.partial_artifact_url().map(str::to_owned),
            reason: exhausted.error.to_string(),
        }
    }
}

/// Drives the code generator under a retry policy.
#[derive(Clone)]
pub struct GenerationDispatcher {
    generator: Arc<dyn CodeGenerator>,
    policy: RetryPolicy,
}

impl GenerationDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub const fn new(generator: Arc<dyn CodeGenerator>, policy: RetryPolicy) -> Self {
        Self { generator, policy }
    }

    /// Generates the sources for one round.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchFailure`] once the retry budget is spent or the
    /// generator fails permanently.
    pub async fn dispatch(
        &self,
        request: &GenerationRequest,
    ) -> Result<SourceBundle, DispatchFailure> {
        let bundle = self
            .policy
            .run("generate", |_| self.generator.generate(request))
            .await?;
        if bundle.is_empty() {
            return Err(DispatchFailure {
                attempts: 1,
                reason: "generator returned an empty bundle".to_owned(),
                partial_artifact_url: None,
            });
        }
        Ok(bundle)
    }
}

impl fmt::Debug for GenerationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationDispatcher")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Drives the artifact publisher under a retry policy.
///
/// Partial publishes are never retried, because retrying could leave a
/// second artifact behind.
#[derive(Clone)]
pub struct PublishDispatcher {
    publisher: Arc<dyn ArtifactPublisher>,
    policy: RetryPolicy,
}

impl PublishDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub const fn new(publisher: Arc<dyn ArtifactPublisher>, policy: RetryPolicy) -> Self {
        Self {
            publisher,
            policy: policy.with_retryable(retryable_publish_error),
        }
    }

    /// Publishes the bundle as the task's live artifact.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchFailure`] when publishing fails, or when the
    /// publisher reports a location other than the existing live artifact.
    pub async fn dispatch(
        &self,
        target: &PublishTarget,
        bundle: &SourceBundle,
    ) -> Result<PublishReceipt, DispatchFailure> {
        let receipt = self
            .policy
            .run("publish", |_| self.publisher.publish(target, bundle))
            .await?;
        match target.live_artifact_url.as_deref() {
            Some(live) if live != receipt.artifact_url => Err(DispatchFailure {
                attempts: 1,
                reason: format!(
                    "publisher moved the live artifact from {live} to {}",
                    receipt.artifact_url
                ),
                partial_artifact_url: Some(receipt.artifact_url),
            }),
            _ => Ok(receipt),
        }
    }
}

impl fmt::Debug for PublishDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishDispatcher")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn retryable_publish_error(error: &CollaboratorError) -> bool {
    error.partial_artifact_url().is_none() && error.is_transient()
}

/// Delivers evaluation notices under a retry policy.
#[derive(Clone)]
pub struct NotifyDispatcher {
    notifier: Arc<dyn EvaluationNotifier>,
    policy: RetryPolicy,
}

impl NotifyDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub const fn new(notifier: Arc<dyn EvaluationNotifier>, policy: RetryPolicy) -> Self {
        Self { notifier, policy }
    }

    /// Sends `notice` to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchFailure`] once delivery has failed for good.
    pub async fn dispatch(
        &self,
        endpoint: &str,
        notice: &EvaluationNotice,
    ) -> Result<(), DispatchFailure> {
        self.policy
            .run("notify", |_| self.notifier.notify(endpoint, notice))
            .await
            .map_err(DispatchFailure::from)
    }
}

impl fmt::Debug for NotifyDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyDispatcher")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

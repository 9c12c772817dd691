//! HTTP adapter delivering evaluation notices with `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::task::ports::{CollaboratorError, EvaluationNotice, EvaluationNotifier};

/// Posts evaluation notices as JSON to the checker endpoint.
#[derive(Debug, Clone)]
pub struct HttpEvaluationNotifier {
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpEvaluationNotifier {
    /// Creates a notifier whose requests time out after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let http = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => client,
            Err(err) => {
                tracing::warn!(error = %err, "failed to configure reqwest client; using defaults");
                reqwest::Client::new()
            }
        };
        Self { http, timeout }
    }
}

#[async_trait]
impl EvaluationNotifier for HttpEvaluationNotifier {
    async fn notify(
        &self,
        endpoint: &str,
        notice: &EvaluationNotice,
    ) -> Result<(), CollaboratorError> {
        let response = self
            .http
            .post(endpoint)
            .json(notice)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    CollaboratorError::Timeout(self.timeout)
                } else {
                    CollaboratorError::Network(err.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response.text().await.unwrap_or_default();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CollaboratorError::RateLimited(message));
        }
        Err(CollaboratorError::Upstream {
            status: status.as_u16(),
            message,
        })
    }
}

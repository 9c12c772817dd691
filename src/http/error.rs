//! Mapping of orchestration failures onto HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::{
    domain::TaskDomainError,
    ports::TaskRepositoryError,
    services::OrchestrationError,
};

/// Error body returned for every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error detail.
    pub error: ErrorDetail,
}

/// Machine-readable code, message and round coordinates of a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    /// Stable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Task the failure refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Round the failure refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
    /// Artifact left behind by a failed publish.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_artifact_url: Option<String>,
}

/// Errors produced by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Service-level failure.
    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    /// The request body or query could not be decoded.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// No route matched.
    #[error("not found: {0}")]
    RouteNotFound(String),
}

impl ApiError {
    /// Status code and stable code string for the error.
    #[must_use]
    pub const fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Malformed(_) => (StatusCode::BAD_REQUEST, "MALFORMED_REQUEST"),
            Self::RouteNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Orchestration(err) => classify_orchestration(err),
        }
    }

    fn detail(&self) -> ErrorDetail {
        let (_, code) = self.classify();
        let (task_id, round, partial_artifact_url) = match self {
            Self::Orchestration(err) => (
                err.task_id().map(|id| id.as_str().to_owned()),
                err.round().map(|round| round.value()),
                match err {
                    OrchestrationError::PublishFailed {
                        partial_artifact_url,
                        ..
                    } => partial_artifact_url.clone(),
                    _ => None,
                },
            ),
            Self::Malformed(_) | Self::RouteNotFound(_) => (None, None, None),
        };
        ErrorDetail {
            code: code.to_owned(),
            message: self.to_string(),
            task_id,
            round,
            partial_artifact_url,
        }
    }
}

const fn classify_orchestration(err: &OrchestrationError) -> (StatusCode, &'static str) {
    match err {
        OrchestrationError::Unauthorized => (StatusCode::FORBIDDEN, "UNAUTHORIZED"),
        OrchestrationError::NotTaskOwner { .. } => (StatusCode::FORBIDDEN, "NOT_TASK_OWNER"),
        OrchestrationError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        OrchestrationError::TaskNotFound(_)
        | OrchestrationError::Repository(TaskRepositoryError::NotFound(_)) => {
            (StatusCode::NOT_FOUND, "TASK_NOT_FOUND")
        }
        OrchestrationError::Domain(domain) => classify_domain(domain),
        OrchestrationError::Repository(TaskRepositoryError::VersionConflict { .. })
        | OrchestrationError::Conflict { .. } => (StatusCode::CONFLICT, "CONFLICT"),
        OrchestrationError::Repository(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        }
        OrchestrationError::GenerationFailed { .. } => {
            (StatusCode::BAD_GATEWAY, "GENERATION_FAILED")
        }
        OrchestrationError::PublishFailed { .. } => (StatusCode::BAD_GATEWAY, "PUBLISH_FAILED"),
        OrchestrationError::StillProcessing { .. } => (StatusCode::ACCEPTED, "STILL_PROCESSING"),
        OrchestrationError::Interrupted { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "INTERRUPTED")
        }
    }
}

const fn classify_domain(err: &TaskDomainError) -> (StatusCode, &'static str) {
    match err {
        TaskDomainError::InvalidIdentity(_)
        | TaskDomainError::InvalidTemplate(_)
        | TaskDomainError::InvalidTaskId(_)
        | TaskDomainError::InvalidNonce(_)
        | TaskDomainError::EmptyBrief
        | TaskDomainError::ZeroRound(_)
        | TaskDomainError::InvalidRoundNumber { .. } => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
        }
        TaskDomainError::UnknownRound { .. } => (StatusCode::NOT_FOUND, "ROUND_NOT_FOUND"),
        TaskDomainError::DuplicateNonce { .. } => (StatusCode::CONFLICT, "DUPLICATE_NONCE"),
        TaskDomainError::RoundAlreadyExists { .. } => {
            (StatusCode::CONFLICT, "ROUND_ALREADY_EXISTS")
        }
        TaskDomainError::RoundNotPublished { .. }
        | TaskDomainError::StaleState { .. }
        | TaskDomainError::InvalidTransition { .. }
        | TaskDomainError::CorrelationMismatch { .. } => (StatusCode::CONFLICT, "CONFLICT"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.classify();
        if status.is_server_error() {
            tracing::error!(code, error = %self, "request failed");
        } else {
            tracing::debug!(code, error = %self, "request rejected");
        }
        (status, Json(ErrorBody { error: self.detail() })).into_response()
    }
}

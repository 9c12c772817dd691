//! Request handlers.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{OriginalUri, Path, Query, State};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState};
use crate::task::{
    domain::{RoundView, TaskSummary},
    ports::TaskRepository,
    services::{Ack, BuildRequest, EvaluationCallback, ReviseRequest},
};

/// Query string of the results endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ResultsQuery {
    /// Round to report; the latest round when absent.
    #[serde(default)]
    pub round: Option<u32>,
}

/// Tasks owned by one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskListResponse {
    /// Normalized identity.
    pub identity: String,
    /// Number of tasks.
    pub count: usize,
    /// Task summaries, oldest first.
    pub tasks: Vec<TaskSummary>,
}

/// Liveness probe body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `ok`.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Time of the probe.
    pub timestamp: DateTime<Utc>,
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::Malformed(rejection.body_text()))
}

pub(super) async fn build<R, C>(
    State(state): State<AppState<R, C>>,
    payload: Result<Json<BuildRequest>, JsonRejection>,
) -> Result<Json<RoundView>, ApiError>
where
    R: TaskRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    let request = body(payload)?;
    let view = state.controller.build(request).await?;
    Ok(Json(view))
}

pub(super) async fn revise<R, C>(
    State(state): State<AppState<R, C>>,
    payload: Result<Json<ReviseRequest>, JsonRejection>,
) -> Result<Json<RoundView>, ApiError>
where
    R: TaskRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    let request = body(payload)?;
    let view = state.controller.revise(request).await?;
    Ok(Json(view))
}

pub(super) async fn results<R, C>(
    State(state): State<AppState<R, C>>,
    Path(task_id): Path<String>,
    query: Result<Query<ResultsQuery>, QueryRejection>,
) -> Result<Json<RoundView>, ApiError>
where
    R: TaskRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    let Query(query) = query.map_err(|rejection| ApiError::Malformed(rejection.body_text()))?;
    let view = state.controller.results(&task_id, query.round).await?;
    Ok(Json(view))
}

pub(super) async fn tasks<R, C>(
    State(state): State<AppState<R, C>>,
    Path(identity): Path<String>,
) -> Result<Json<TaskListResponse>, ApiError>
where
    R: TaskRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    let tasks = state.controller.tasks(&identity).await?;
    Ok(Json(TaskListResponse {
        identity: identity.trim().to_ascii_lowercase(),
        count: tasks.len(),
        tasks,
    }))
}

/// Always answers `200`; rejections are logged, never returned.
pub(super) async fn evaluate<R, C>(
    State(state): State<AppState<R, C>>,
    payload: Result<Json<EvaluationCallback>, JsonRejection>,
) -> Json<Ack>
where
    R: TaskRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    match payload {
        Ok(Json(callback)) => Json(state.reconciler.receive(&callback).await),
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "malformed evaluation callback");
            Json(Ack { accepted: false })
        }
    }
}

pub(super) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_owned(),
        service: env!("CARGO_PKG_NAME").to_owned(),
        timestamp: Utc::now(),
    })
}

pub(super) async fn not_found(uri: OriginalUri) -> ApiError {
    ApiError::RouteNotFound(uri.0.path().to_owned())
}

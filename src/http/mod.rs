//! HTTP facade over the round controller and evaluation reconciler.
//!
//! | Method | Path                          | Operation                |
//! |--------|-------------------------------|--------------------------|
//! | POST   | `/api/build`                  | build round one          |
//! | POST   | `/api/revise`                 | open a revision round    |
//! | GET    | `/api/results/:task_id`       | round status             |
//! | GET    | `/api/tasks/:identity`        | tasks owned by identity  |
//! | POST   | `/api/evaluate/webhook`       | evaluation callback      |
//! | GET    | `/health`                     | liveness                 |

mod error;
mod routes;
mod state;

pub use error::{ApiError, ErrorBody, ErrorDetail};
pub use routes::{HealthResponse, ResultsQuery, TaskListResponse};
pub use state::AppState;

use axum::Router;
use axum::routing::{get, post};
use mockable::Clock;
use tower_http::trace::TraceLayer;

use crate::task::ports::TaskRepository;

/// Creates the pagewright router.
pub fn router<R, C>(state: AppState<R, C>) -> Router
where
    R: TaskRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    Router::new()
        .route("/api/build", post(routes::build::<R, C>))
        .route("/api/revise", post(routes::revise::<R, C>))
        .route("/api/results/:task_id", get(routes::results::<R, C>))
        .route("/api/tasks/:identity", get(routes::tasks::<R, C>))
        .route("/api/evaluate/webhook", post(routes::evaluate::<R, C>))
        .route("/health", get(routes::health))
        .fallback(routes::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

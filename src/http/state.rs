//! Shared state for HTTP handlers.

use std::sync::Arc;

use mockable::Clock;

use crate::task::{
    ports::TaskRepository,
    services::{EvaluationReconciler, RoundController},
};

/// Services reachable from every handler.
pub struct AppState<R, C>
where
    R: TaskRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Build, revise and query operations.
    pub controller: RoundController<R, C>,
    /// Evaluation callback handling.
    pub reconciler: Arc<EvaluationReconciler<R, C>>,
}

impl<R, C> AppState<R, C>
where
    R: TaskRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates handler state; the reconciler shares the controller's registry.
    #[must_use]
    pub fn new(controller: RoundController<R, C>) -> Self {
        let reconciler = Arc::new(EvaluationReconciler::new(Arc::clone(
            controller.registry(),
        )));
        Self {
            controller,
            reconciler,
        }
    }
}

impl<R, C> Clone for AppState<R, C>
where
    R: TaskRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
            reconciler: Arc::clone(&self.reconciler),
        }
    }
}

impl<R, C> std::fmt::Debug for AppState<R, C>
where
    R: TaskRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

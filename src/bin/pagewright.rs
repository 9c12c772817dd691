//! Runs the pagewright HTTP server.
//!
//! Configuration is read from `PAGEWRIGHT_*` environment variables; see
//! [`pagewright::config::Config`]. Generation and publishing use the
//! in-process adapters, and evaluation notices are POSTed with `reqwest`.

use std::sync::Arc;

use anyhow::Context;
use mockable::DefaultClock;
use pagewright::{
    config::Config,
    http::{AppState, router},
    observability::init_logging,
    task::{
        adapters::{
            http::HttpEvaluationNotifier,
            memory::{InMemoryGenerator, InMemoryPublisher, InMemoryTaskRepository},
        },
        services::{
            AuthorizationGuard, GenerationDispatcher, NotifyDispatcher, PublishDispatcher,
            RoundController, TaskRegistry,
        },
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    init_logging(config.log_format);

    let catalog = config.catalog().context("invalid template catalog")?;
    let registry = Arc::new(TaskRegistry::new(
        Arc::new(InMemoryTaskRepository::new()),
        Arc::new(DefaultClock),
        catalog,
    ));

    tracing::warn!(
        pages_base_url = %config.pages_base_url,
        "using in-process generation and publishing collaborators"
    );
    let policy = config.retry_policy();
    let controller = RoundController::new(
        registry,
        AuthorizationGuard::new(config.shared_secret.clone()),
        GenerationDispatcher::new(Arc::new(InMemoryGenerator::new()), policy.clone()),
        PublishDispatcher::new(
            Arc::new(InMemoryPublisher::new(config.pages_base_url.clone())),
            policy.clone(),
        ),
        config.controller_settings(),
    )
    .with_notifier(NotifyDispatcher::new(
        Arc::new(HttpEvaluationNotifier::new(config.dispatch_timeout)),
        policy,
    ));

    let app = router(AppState::new(controller));
    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    tracing::info!(%address, "pagewright listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

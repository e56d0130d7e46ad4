// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! FitForge Workouts API Server
//!
//! Starts, logs and completes workout sessions stored in Firestore and
//! streams row changes to subscribed clients.

use fitforge_workouts::{
    config::Config,
    db::{FirestoreDb, InMemoryDb, WorkoutRepository},
    realtime::ChangeFeed,
    services::{AnalyticsAggregator, HttpAnalyticsClient, NoopAnalytics, WorkoutService},
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How long shutdown waits for queued analytics jobs.
const ANALYTICS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting FitForge Workouts API");

    let changes = ChangeFeed::new();

    let repo: Arc<dyn WorkoutRepository> = if config.use_in_memory_db {
        tracing::warn!("Using in-memory database, data will not persist");
        Arc::new(InMemoryDb::new(changes))
    } else {
        Arc::new(FirestoreDb::new(&config.gcp_project_id, changes).await?)
    };

    let aggregator: Arc<dyn AnalyticsAggregator> = match &config.analytics_url {
        Some(url) => {
            tracing::info!(url = %url, "Analytics aggregator configured");
            Arc::new(HttpAnalyticsClient::new(url.clone())?)
        }
        None => {
            tracing::info!("No ANALYTICS_URL set, analytics side-calls disabled");
            Arc::new(NoopAnalytics)
        }
    };

    let service = WorkoutService::new(repo, aggregator);

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        service: service.clone(),
    });

    // Build router
    let app = fitforge_workouts::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let queued analytics jobs finish before exiting.
    service
        .analytics()
        .wait_idle_for(ANALYTICS_DRAIN_TIMEOUT)
        .await;
    let failed = service.analytics().dead_letters().len();
    tracing::info!(failed_analytics_steps = failed, "Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,fitforge_workouts=debug")),
        )
        .with(format)
        .init();
}

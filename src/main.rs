//! nimbus-broker server entry point.
//!
//! Starts the Axum HTTP server hosting the WebSocket stream endpoint.

use std::sync::Arc;

use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use nimbus_broker::app_state::AppState;
use nimbus_broker::auth::{Authenticator, StaticTokenAuthenticator};
use nimbus_broker::config::BrokerConfig;
use nimbus_broker::service::MessageBroker;
use nimbus_broker::worker::{
    BrokerCommandWorker, CommandWorker, FetchWorker, RegistryFetchWorker,
};
use nimbus_broker::ws::handler::ws_handler;

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
}

/// `GET /health` — Service health status.
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Arc::new(BrokerConfig::from_env()?);
    tracing::info!(addr = %config.listen_addr, broker_id = %config.broker_id, "starting nimbus-broker");

    // Build the messaging core
    let broker = MessageBroker::new(config.broker_id.clone());

    // Explicit worker registration: the hosting program decides which
    // workers handle traffic.
    let auth: Arc<dyn Authenticator> =
        Arc::new(StaticTokenAuthenticator::new(config.auth_secret.clone()));
    let command_worker: Arc<dyn CommandWorker> = Arc::new(BrokerCommandWorker::new(
        broker.clone(),
        Arc::clone(&auth),
        config.response_timeout(),
    ));
    let fetch_worker: Arc<dyn FetchWorker> =
        Arc::new(RegistryFetchWorker::new(broker.clone(), auth));

    // Build application state
    let app_state = AppState {
        config: Arc::clone(&config),
        broker,
        command_worker,
        fetch_worker,
    };

    // Build router
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

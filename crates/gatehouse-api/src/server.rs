//! Publishing API server

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use gatehouse_publisher::Publisher;
use tracing::info;

use crate::auth::Authenticator;
use crate::error::Error;
use crate::handlers;

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address to bind the server
    pub addr: SocketAddr,
}

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    /// Publishing workflows
    pub publisher: Arc<Publisher>,
    /// Operator token and API key authentication
    pub auth: Arc<Authenticator>,
}

impl AppState {
    /// State over a publisher, accepting the given operator tokens
    pub fn new(publisher: Publisher, operator_tokens: &[String]) -> Self {
        let publisher = Arc::new(publisher);
        Self {
            auth: Arc::new(Authenticator::new(operator_tokens, publisher.clone())),
            publisher,
        }
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/healthz", get(|| async { "ok" }))
        // Gateway-facing key checks, unauthenticated
        .route("/api/v1/validate-key", post(handlers::validate_key))
        .route("/api/v1/auth/verify", get(handlers::verify))
        // Publishing lifecycle
        .route(
            "/api/v1/namespaces/{namespace}/models/{model}/publish",
            post(handlers::publish)
                .put(handlers::update)
                .get(handlers::get_published)
                .delete(handlers::unpublish),
        )
        .route(
            "/api/v1/namespaces/{namespace}/models/{model}/publish/rotate-key",
            post(handlers::rotate_key),
        )
        .route(
            "/api/v1/namespaces/{namespace}/published-models",
            get(handlers::list_namespace),
        )
        .route("/api/v1/published-models", get(handlers::list_all))
        // Usage
        .route(
            "/api/v1/namespaces/{namespace}/models/{model}/usage",
            post(handlers::record_usage).get(handlers::usage_summary),
        )
        .with_state(state)
}

/// Start the API server
pub async fn start_server(config: ServerConfig, state: AppState) -> Result<(), Error> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .map_err(|e| Error::Internal(format!("failed to bind {}: {}", config.addr, e)))?;

    info!(addr = %config.addr, "Starting publishing API server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::errors::ShipyardError;
use crate::server::handlers::{
    create_stack_handler, deploy_stack_handler, deployment_log_handler, get_stack_handler,
    health_handler, list_deployments_handler,
};
use crate::server::state::ServerState;
use crate::storage::settings::ServerSettings;

/// Routes of the deployment API
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health
        .route("/health", get(health_handler))
        // Stacks
        .route("/api/v1/stacks", post(create_stack_handler))
        .route("/api/v1/stacks/{id}", get(get_stack_handler))
        .route("/api/v1/stacks/{id}/deployments", get(list_deployments_handler))
        .route("/api/v1/stacks/{id}/deploy", post(deploy_stack_handler))
        // Deployments
        .route("/api/v1/deployments/{id}/log", get(deployment_log_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerSettings,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), ShipyardError>>, ShipyardError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ShipyardError::Server(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ShipyardError::Server(e.to_string()))
    });

    Ok(handle)
}

//! Server run loop

use std::future::Future;
use std::sync::Arc;

use tracing::info;

use crate::app::state::AppState;
use crate::errors::ShipyardError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Serve the deployment API until `shutdown_signal` resolves
pub async fn run_server(
    layout: &StorageLayout,
    settings: Settings,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ShipyardError> {
    info!("Initializing shipyard server...");
    let app_state = AppState::init(layout, settings).await?;

    let server_state = Arc::new(ServerState::new(
        app_state.orchestrator.clone(),
        app_state.store.clone(),
    ));
    let handle = serve(&app_state.settings.server, server_state, shutdown_signal).await?;

    handle
        .await
        .map_err(|e| ShipyardError::Server(format!("server task panicked: {}", e)))??;

    info!("Server stopped");
    Ok(())
}

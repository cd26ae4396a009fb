//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::command::{CommandExecutor, ProcessRunner};
use crate::deploy::Orchestrator;
use crate::errors::ShipyardError;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::store::{JsonStore, Store};

/// Long-lived components shared by the CLI commands and the server
pub struct AppState {
    pub settings: Settings,
    pub store: Arc<dyn Store>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Open the store in `layout` and wire the orchestrator to real processes
    pub async fn init(layout: &StorageLayout, settings: Settings) -> Result<Self, ShipyardError> {
        info!("Initializing app state from {}...", layout.base_dir.display());

        let store: Arc<dyn Store> = Arc::new(JsonStore::open(layout.store_file()).await?);
        let executor: Arc<dyn CommandExecutor> = Arc::new(ProcessRunner::new());

        Ok(Self::with_components(settings, store, executor))
    }

    pub fn with_components(
        settings: Settings,
        store: Arc<dyn Store>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let orchestrator = Arc::new(Orchestrator::new(settings.clone(), store.clone(), executor));
        Self {
            settings,
            store,
            orchestrator,
        }
    }
}

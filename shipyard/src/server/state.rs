//! Server state

use std::sync::Arc;

use crate::deploy::Orchestrator;
use crate::store::Store;

/// Server state shared across handlers
pub struct ServerState {
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<dyn Store>,
}

impl ServerState {
    pub fn new(orchestrator: Arc<Orchestrator>, store: Arc<dyn Store>) -> Self {
        Self {
            orchestrator,
            store,
        }
    }
}

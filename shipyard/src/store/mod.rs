//! Persistence for applications, deployments and supervisor registrations

pub mod data;
pub mod json;
pub mod memory;

use std::path::Path;

use async_trait::async_trait;

use crate::errors::ShipyardError;
use crate::models::{
    Application, ApplicationUpdate, Deployment, DeploymentLog, DeploymentStatus, DeploymentUpdate,
    NewApplication, NewProcessRegistration, ProcessRegistration,
};

pub use json::JsonStore;
pub use memory::MemoryStore;

/// Storage backend consumed by the orchestrator
///
/// Lookups return `Ok(None)` for missing records; updates of missing records
/// fail with [`ShipyardError::NotFound`].
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_application(&self, new: NewApplication) -> Result<Application, ShipyardError>;

    async fn get_application(&self, id: i64) -> Result<Option<Application>, ShipyardError>;

    async fn get_application_by_directory(
        &self,
        directory: &Path,
    ) -> Result<Option<Application>, ShipyardError>;

    async fn list_applications(&self) -> Result<Vec<Application>, ShipyardError>;

    async fn update_application(
        &self,
        id: i64,
        update: ApplicationUpdate,
    ) -> Result<Application, ShipyardError>;

    async fn create_deployment(
        &self,
        application_id: i64,
        status: DeploymentStatus,
    ) -> Result<Deployment, ShipyardError>;

    async fn get_deployment(&self, id: i64) -> Result<Option<Deployment>, ShipyardError>;

    /// Deployments of one application, oldest first
    async fn list_deployments(&self, application_id: i64) -> Result<Vec<Deployment>, ShipyardError>;

    async fn update_deployment(
        &self,
        id: i64,
        update: DeploymentUpdate,
    ) -> Result<Deployment, ShipyardError>;

    async fn create_process(
        &self,
        new: NewProcessRegistration,
    ) -> Result<ProcessRegistration, ShipyardError>;

    async fn get_process_by_application(
        &self,
        application_id: i64,
    ) -> Result<Option<ProcessRegistration>, ShipyardError>;

    async fn create_deployment_log(
        &self,
        deployment_id: i64,
        log: String,
    ) -> Result<DeploymentLog, ShipyardError>;

    async fn get_deployment_log(
        &self,
        deployment_id: i64,
    ) -> Result<Option<DeploymentLog>, ShipyardError>;
}

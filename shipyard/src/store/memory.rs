//! In-memory store

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::data::StoreData;
use super::Store;
use crate::errors::ShipyardError;
use crate::models::{
    Application, ApplicationUpdate, Deployment, DeploymentLog, DeploymentStatus, DeploymentUpdate,
    NewApplication, NewProcessRegistration, ProcessRegistration,
};

/// Store that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every table
    pub async fn snapshot(&self) -> StoreData {
        self.data.read().await.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_application(&self, new: NewApplication) -> Result<Application, ShipyardError> {
        self.data.write().await.create_application(new)
    }

    async fn get_application(&self, id: i64) -> Result<Option<Application>, ShipyardError> {
        Ok(self.data.read().await.get_application(id))
    }

    async fn get_application_by_directory(
        &self,
        directory: &Path,
    ) -> Result<Option<Application>, ShipyardError> {
        Ok(self.data.read().await.get_application_by_directory(directory))
    }

    async fn list_applications(&self) -> Result<Vec<Application>, ShipyardError> {
        Ok(self.data.read().await.applications.clone())
    }

    async fn update_application(
        &self,
        id: i64,
        update: ApplicationUpdate,
    ) -> Result<Application, ShipyardError> {
        self.data.write().await.update_application(id, update)
    }

    async fn create_deployment(
        &self,
        application_id: i64,
        status: DeploymentStatus,
    ) -> Result<Deployment, ShipyardError> {
        self.data.write().await.create_deployment(application_id, status)
    }

    async fn get_deployment(&self, id: i64) -> Result<Option<Deployment>, ShipyardError> {
        Ok(self.data.read().await.get_deployment(id))
    }

    async fn list_deployments(&self, application_id: i64) -> Result<Vec<Deployment>, ShipyardError> {
        Ok(self.data.read().await.list_deployments(application_id))
    }

    async fn update_deployment(
        &self,
        id: i64,
        update: DeploymentUpdate,
    ) -> Result<Deployment, ShipyardError> {
        self.data.write().await.update_deployment(id, update)
    }

    async fn create_process(
        &self,
        new: NewProcessRegistration,
    ) -> Result<ProcessRegistration, ShipyardError> {
        self.data.write().await.create_process(new)
    }

    async fn get_process_by_application(
        &self,
        application_id: i64,
    ) -> Result<Option<ProcessRegistration>, ShipyardError> {
        Ok(self.data.read().await.get_process_by_application(application_id))
    }

    async fn create_deployment_log(
        &self,
        deployment_id: i64,
        log: String,
    ) -> Result<DeploymentLog, ShipyardError> {
        self.data.write().await.create_deployment_log(deployment_id, log)
    }

    async fn get_deployment_log(
        &self,
        deployment_id: i64,
    ) -> Result<Option<DeploymentLog>, ShipyardError> {
        Ok(self.data.read().await.get_deployment_log(deployment_id))
    }
}

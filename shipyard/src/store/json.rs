//! JSON file store
//!
//! The CLI and the server share one file, so nothing is cached between calls.
//! Every operation takes a lock on a sibling `.lock` file, re-reads the
//! document and, for mutations, writes it back atomically before releasing.
//! A mutation that fails leaves the file unchanged.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use tracing::debug;

use super::data::StoreData;
use super::Store;
use crate::errors::ShipyardError;
use crate::filesys::file::File;
use crate::models::{
    Application, ApplicationUpdate, Deployment, DeploymentLog, DeploymentStatus, DeploymentUpdate,
    NewApplication, NewProcessRegistration, ProcessRegistration,
};

/// Store backed by a single JSON document on disk
#[derive(Debug)]
pub struct JsonStore {
    file: File,
    lock_path: PathBuf,
}

/// Advisory lock held until dropped
struct StoreLock(std::fs::File);

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.0);
    }
}

impl JsonStore {
    /// Open the store, checking that an existing file decodes
    pub async fn open(file: File) -> Result<Self, ShipyardError> {
        let store = Self {
            lock_path: file.path().with_extension("lock"),
            file,
        };

        let data = {
            let _lock = store.lock(false).await?;
            store.load().await?
        };
        debug!(
            "Opened store {} ({} applications)",
            store.file.path().display(),
            data.applications.len()
        );

        Ok(store)
    }

    /// Write the current contents, creating the file if needed
    pub async fn flush(&self) -> Result<(), ShipyardError> {
        let _lock = self.lock(true).await?;
        let data = self.load().await?;
        self.persist(&data).await
    }

    async fn lock(&self, exclusive: bool) -> Result<StoreLock, ShipyardError> {
        let path = self.lock_path.clone();
        let locked = tokio::task::spawn_blocking(move || -> std::io::Result<StoreLock> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)?;
            if exclusive {
                FileExt::lock_exclusive(&file)?;
            } else {
                FileExt::lock_shared(&file)?;
            }
            Ok(StoreLock(file))
        })
        .await
        .map_err(|e| ShipyardError::Internal(format!("store lock task failed: {}", e)))?;

        locked.map_err(|e| {
            ShipyardError::Persistence(format!(
                "failed to lock {}: {}",
                self.lock_path.display(),
                e
            ))
        })
    }

    async fn load(&self) -> Result<StoreData, ShipyardError> {
        if !self.file.exists().await {
            return Ok(StoreData::default());
        }
        self.file.read_json::<StoreData>().await.map_err(|e| {
            ShipyardError::Persistence(format!(
                "failed to read {}: {}",
                self.file.path().display(),
                e
            ))
        })
    }

    async fn persist(&self, data: &StoreData) -> Result<(), ShipyardError> {
        self.file.write_json(data).await.map_err(|e| {
            ShipyardError::Persistence(format!(
                "failed to write {}: {}",
                self.file.path().display(),
                e
            ))
        })
    }

    async fn read<T>(&self, f: impl FnOnce(&StoreData) -> T) -> Result<T, ShipyardError> {
        let _lock = self.lock(false).await?;
        let data = self.load().await?;
        Ok(f(&data))
    }

    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut StoreData) -> Result<T, ShipyardError>,
    ) -> Result<T, ShipyardError> {
        let _lock = self.lock(true).await?;
        let mut data = self.load().await?;
        let result = f(&mut data)?;
        self.persist(&data).await?;
        Ok(result)
    }
}

#[async_trait]
impl Store for JsonStore {
    async fn create_application(&self, new: NewApplication) -> Result<Application, ShipyardError> {
        self.mutate(|d| d.create_application(new)).await
    }

    async fn get_application(&self, id: i64) -> Result<Option<Application>, ShipyardError> {
        self.read(|d| d.get_application(id)).await
    }

    async fn get_application_by_directory(
        &self,
        directory: &Path,
    ) -> Result<Option<Application>, ShipyardError> {
        self.read(|d| d.get_application_by_directory(directory)).await
    }

    async fn list_applications(&self) -> Result<Vec<Application>, ShipyardError> {
        self.read(|d| d.applications.clone()).await
    }

    async fn update_application(
        &self,
        id: i64,
        update: ApplicationUpdate,
    ) -> Result<Application, ShipyardError> {
        self.mutate(|d| d.update_application(id, update)).await
    }

    async fn create_deployment(
        &self,
        application_id: i64,
        status: DeploymentStatus,
    ) -> Result<Deployment, ShipyardError> {
        self.mutate(|d| d.create_deployment(application_id, status))
            .await
    }

    async fn get_deployment(&self, id: i64) -> Result<Option<Deployment>, ShipyardError> {
        self.read(|d| d.get_deployment(id)).await
    }

    async fn list_deployments(&self, application_id: i64) -> Result<Vec<Deployment>, ShipyardError> {
        self.read(|d| d.list_deployments(application_id)).await
    }

    async fn update_deployment(
        &self,
        id: i64,
        update: DeploymentUpdate,
    ) -> Result<Deployment, ShipyardError> {
        self.mutate(|d| d.update_deployment(id, update)).await
    }

    async fn create_process(
        &self,
        new: NewProcessRegistration,
    ) -> Result<ProcessRegistration, ShipyardError> {
        self.mutate(|d| d.create_process(new)).await
    }

    async fn get_process_by_application(
        &self,
        application_id: i64,
    ) -> Result<Option<ProcessRegistration>, ShipyardError> {
        self.read(|d| d.get_process_by_application(application_id))
            .await
    }

    async fn create_deployment_log(
        &self,
        deployment_id: i64,
        log: String,
    ) -> Result<DeploymentLog, ShipyardError> {
        self.mutate(|d| d.create_deployment_log(deployment_id, log))
            .await
    }

    async fn get_deployment_log(
        &self,
        deployment_id: i64,
    ) -> Result<Option<DeploymentLog>, ShipyardError> {
        self.read(|d| d.get_deployment_log(deployment_id)).await
    }
}

//! Record tables shared by the store implementations

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ShipyardError;
use crate::models::{
    Application, ApplicationUpdate, Deployment, DeploymentLog, DeploymentStatus, DeploymentUpdate,
    NewApplication, NewProcessRegistration, ProcessRegistration,
};

/// All persisted records. Ids are positive and never reused.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreData {
    #[serde(default)]
    pub applications: Vec<Application>,

    #[serde(default)]
    pub deployments: Vec<Deployment>,

    #[serde(default)]
    pub processes: Vec<ProcessRegistration>,

    #[serde(default)]
    pub deployment_logs: Vec<DeploymentLog>,
}

fn next_id<T>(items: &[T], id: impl Fn(&T) -> i64) -> i64 {
    items.iter().map(id).max().unwrap_or(0) + 1
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl StoreData {
    pub fn create_application(&mut self, new: NewApplication) -> Result<Application, ShipyardError> {
        if self.applications.iter().any(|a| a.directory == new.directory) {
            return Err(ShipyardError::Persistence(format!(
                "an application already uses directory {}",
                new.directory.display()
            )));
        }

        let app = Application {
            id: next_id(&self.applications, |a| a.id),
            uuid: uuid::Uuid::new_v4().to_string(),
            name: new.name,
            directory: new.directory,
            stack_type: new.stack_type,
            repo_url: new.repo_url,
            branch: new.branch,
            remote: new.remote,
            port: new.port,
            commands: new.commands,
            created_successfully: false,
            initial_deployment_success: false,
            created_at: now(),
        };
        self.applications.push(app.clone());
        Ok(app)
    }

    pub fn get_application(&self, id: i64) -> Option<Application> {
        self.applications.iter().find(|a| a.id == id).cloned()
    }

    pub fn get_application_by_directory(&self, directory: &Path) -> Option<Application> {
        self.applications
            .iter()
            .find(|a| a.directory == directory)
            .cloned()
    }

    pub fn update_application(
        &mut self,
        id: i64,
        update: ApplicationUpdate,
    ) -> Result<Application, ShipyardError> {
        let app = self
            .applications
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| ShipyardError::NotFound(format!("application {}", id)))?;
        update.apply(app);
        Ok(app.clone())
    }

    pub fn create_deployment(
        &mut self,
        application_id: i64,
        status: DeploymentStatus,
    ) -> Result<Deployment, ShipyardError> {
        if self.get_application(application_id).is_none() {
            return Err(ShipyardError::NotFound(format!(
                "application {}",
                application_id
            )));
        }

        let deployment = Deployment {
            id: next_id(&self.deployments, |d| d.id),
            application_id,
            status,
            commit_hash: None,
            rolled_back_from: None,
            deployed_at: now(),
        };
        self.deployments.push(deployment.clone());
        Ok(deployment)
    }

    pub fn get_deployment(&self, id: i64) -> Option<Deployment> {
        self.deployments.iter().find(|d| d.id == id).cloned()
    }

    pub fn list_deployments(&self, application_id: i64) -> Vec<Deployment> {
        self.deployments
            .iter()
            .filter(|d| d.application_id == application_id)
            .cloned()
            .collect()
    }

    pub fn update_deployment(
        &mut self,
        id: i64,
        update: DeploymentUpdate,
    ) -> Result<Deployment, ShipyardError> {
        let deployment = self
            .deployments
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| ShipyardError::NotFound(format!("deployment {}", id)))?;

        if let Some(status) = update.status {
            if deployment.status.is_terminal() && deployment.status != status {
                return Err(ShipyardError::Persistence(format!(
                    "deployment {} is already {}",
                    id, deployment.status
                )));
            }
            deployment.status = status;
        }
        if let Some(hash) = update.commit_hash {
            deployment.commit_hash = Some(hash);
        }
        if let Some(previous) = update.rolled_back_from {
            deployment.rolled_back_from = Some(previous);
        }
        Ok(deployment.clone())
    }

    pub fn create_process(
        &mut self,
        new: NewProcessRegistration,
    ) -> Result<ProcessRegistration, ShipyardError> {
        if self.get_process_by_application(new.application_id).is_some() {
            return Err(ShipyardError::Persistence(format!(
                "application {} already has a process registration",
                new.application_id
            )));
        }

        let process = ProcessRegistration {
            id: next_id(&self.processes, |p| p.id),
            application_id: new.application_id,
            name: new.name,
            script: new.script,
        };
        self.processes.push(process.clone());
        Ok(process)
    }

    pub fn get_process_by_application(&self, application_id: i64) -> Option<ProcessRegistration> {
        self.processes
            .iter()
            .find(|p| p.application_id == application_id)
            .cloned()
    }

    pub fn create_deployment_log(
        &mut self,
        deployment_id: i64,
        log: String,
    ) -> Result<DeploymentLog, ShipyardError> {
        if self.get_deployment(deployment_id).is_none() {
            return Err(ShipyardError::NotFound(format!(
                "deployment {}",
                deployment_id
            )));
        }

        let entry = DeploymentLog {
            id: next_id(&self.deployment_logs, |l| l.id),
            deployment_id,
            log,
        };
        self.deployment_logs.push(entry.clone());
        Ok(entry)
    }

    /// Most recent transcript stored for a deployment
    pub fn get_deployment_log(&self, deployment_id: i64) -> Option<DeploymentLog> {
        self.deployment_logs
            .iter()
            .rev()
            .find(|l| l.deployment_id == deployment_id)
            .cloned()
    }
}

//! Application provisioning and deployment

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::command::CommandExecutor;
use crate::deploy::git::{self, GitSync, UpdateRequest};
use crate::deploy::nodejs::deploy_nodejs;
use crate::deploy::request::{non_empty, AppReference, CreateApplicationRequest, DeployOptions};
use crate::deploy::validate::{self, NODEJS};
use crate::deploy::workspace::{generate_workspace_path, Workspace};
use crate::errors::ShipyardError;
use crate::models::{
    Application, ApplicationUpdate, Commands, DeploymentStatus, DeploymentUpdate, NewApplication,
};
use crate::sink::LogSink;
use crate::storage::settings::Settings;
use crate::store::Store;

/// Attempts at finding an unused workspace path before giving up
const WORKSPACE_PATH_ATTEMPTS: usize = 32;

/// A failed deployment, with the id of the record it left behind (if any)
#[derive(Debug, Error)]
#[error("{error}")]
pub struct DeployFailure {
    pub deployment_id: Option<i64>,
    #[source]
    pub error: ShipyardError,
}

impl From<ShipyardError> for DeployFailure {
    fn from(error: ShipyardError) -> Self {
        Self {
            deployment_id: None,
            error,
        }
    }
}

/// Drives application creation and deployments
pub struct Orchestrator {
    settings: Settings,
    store: Arc<dyn Store>,
    executor: Arc<dyn CommandExecutor>,

    /// One deploy at a time per application
    locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(settings: Settings, store: Arc<dyn Store>, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            settings,
            store,
            executor,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Validate, persist, and provision a new application
    pub async fn create_application(
        &self,
        request: CreateApplicationRequest,
        sink: &dyn LogSink,
    ) -> Result<Application, ShipyardError> {
        let stack_type = request.stack_type.trim().to_string();
        if !self.settings.is_valid_stack(&stack_type) {
            return Err(ShipyardError::Validation(format!(
                "unsupported stack type {:?} (allowed: {})",
                stack_type,
                self.settings.valid_stacks.join(", ")
            )));
        }

        let repo_url = request.repo_url.trim().to_string();
        if repo_url.is_empty() {
            return Err(ShipyardError::Validation("repository url is required".into()));
        }

        let start = match non_empty(request.commands.start.as_deref()) {
            Some(start) => start,
            None => validate::default_start_command(&stack_type)
                .map(str::to_string)
                .ok_or_else(|| {
                    ShipyardError::Validation(format!("a start command is required for {}", stack_type))
                })?,
        };
        validate::validate_start_command(&stack_type, &start)?;

        let branch = non_empty(request.branch.as_deref()).unwrap_or_else(|| self.settings.git.branch.clone());
        let remote = non_empty(request.remote.as_deref()).unwrap_or_else(|| self.settings.git.remote.clone());

        git::verify_access(self.executor.as_ref(), sink, &repo_url).await?;
        validate::validate_port(request.port)?;

        let directory = self.unused_workspace_path(&repo_url).await?;
        let name = match non_empty(request.name.as_deref()) {
            Some(name) => name,
            None => directory
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "app".to_string()),
        };

        let app = self
            .store
            .create_application(NewApplication {
                name,
                directory: directory.clone(),
                stack_type,
                repo_url: repo_url.clone(),
                branch: branch.clone(),
                remote: remote.clone(),
                port: request.port,
                commands: Commands {
                    build: non_empty(request.commands.build.as_deref()),
                    start,
                    post: non_empty(request.commands.post.as_deref()),
                },
            })
            .await?;
        info!("Registered application {} ({}) at {}", app.name, app.id, directory.display());

        sink.emit("");
        sink.emit(&format!("Creating workspace {}...", directory.display()));
        let workspace = Workspace::new(directory);
        workspace.create().await?;
        workspace.enter(sink).await?;

        GitSync::new(self.executor.as_ref(), sink, &workspace)
            .clone_repo(&repo_url, &branch, &remote)
            .await?;

        let app = self
            .store
            .update_application(
                app.id,
                ApplicationUpdate {
                    created_successfully: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        sink.emit("");
        sink.emit(&format!("Application {} created.", app.name));
        Ok(app)
    }

    /// Deploy the latest (or a pinned) revision of an application
    ///
    /// On failure after the deployment record exists, the error carries its
    /// id so the caller can still persist the transcript.
    pub async fn deploy_application(
        &self,
        reference: &AppReference,
        options: DeployOptions,
        sink: &dyn LogSink,
    ) -> Result<i64, DeployFailure> {
        let app = self.resolve(reference).await?;

        let lock = self.lock_for(app.id);
        let _guard = lock.lock().await;

        // A deploy that held the lock may have changed the record
        let mut app = self
            .store
            .get_application(app.id)
            .await?
            .ok_or_else(|| ShipyardError::NotFound(format!("application {}", app.id)))?;

        let branch = non_empty(options.branch.as_deref());
        let remote = non_empty(options.remote.as_deref());
        let update = ApplicationUpdate {
            branch: branch.filter(|b| *b != app.branch),
            remote: remote.filter(|r| *r != app.remote),
            ..Default::default()
        };
        if !update.is_empty() {
            info!("Updating git target of {} to {:?}/{:?}", app.name, update.remote, update.branch);
            app = self.store.update_application(app.id, update).await?;
        }

        let deployment = self
            .store
            .create_deployment(app.id, DeploymentStatus::InProgress)
            .await?;
        info!("Deployment {} of {} started", deployment.id, app.name);

        match self.run_deployment(&app, deployment.id, &options, sink).await {
            Ok(()) => {
                sink.emit("");
                sink.emit("Deployment completed successfully.");
                info!("Deployment {} of {} succeeded", deployment.id, app.name);
                Ok(deployment.id)
            }
            Err(e) => {
                error!("Deployment {} of {} failed: {}", deployment.id, app.name, e);
                if let Err(mark) = self
                    .store
                    .update_deployment(deployment.id, DeploymentUpdate::status(DeploymentStatus::Failed))
                    .await
                {
                    warn!("Could not mark deployment {} failed: {}", deployment.id, mark);
                }
                Err(DeployFailure {
                    deployment_id: Some(deployment.id),
                    error: e,
                })
            }
        }
    }

    /// Store a deployment's captured transcript
    pub async fn save_transcript(&self, deployment_id: i64, log: String) -> Result<(), ShipyardError> {
        self.store.create_deployment_log(deployment_id, log).await?;
        Ok(())
    }

    async fn run_deployment(
        &self,
        app: &Application,
        deployment_id: i64,
        options: &DeployOptions,
        sink: &dyn LogSink,
    ) -> Result<(), ShipyardError> {
        let workspace = Workspace::new(app.directory.clone());
        workspace.enter(sink).await?;

        let request = UpdateRequest {
            branch: app.branch.clone(),
            remote: app.remote.clone(),
            force_reset: options.git_reset.unwrap_or(self.settings.git.reset),
            commit: non_empty(options.git_hash.as_deref()),
        };
        let outcome = GitSync::new(self.executor.as_ref(), sink, &workspace)
            .update(&request)
            .await?;
        self.store
            .update_deployment(deployment_id, DeploymentUpdate::commit_hash(outcome.commit()))
            .await?;

        match app.stack_type.as_str() {
            NODEJS => {
                deploy_nodejs(self.executor.as_ref(), self.store.as_ref(), sink, &workspace, app).await?
            }
            other => sink.emit(&format!("No deploy step for stack type {}", other)),
        }

        if !app.initial_deployment_success {
            self.store
                .update_application(
                    app.id,
                    ApplicationUpdate {
                        initial_deployment_success: Some(true),
                        ..Default::default()
                    },
                )
                .await?;
        }

        self.store
            .update_deployment(deployment_id, DeploymentUpdate::status(DeploymentStatus::Success))
            .await?;
        Ok(())
    }

    async fn resolve(&self, reference: &AppReference) -> Result<Application, ShipyardError> {
        let app = match reference {
            AppReference::Directory(dir) => self.store.get_application_by_directory(dir).await?,
            AppReference::Id(id) => self.store.get_application(*id).await?,
        }
        .ok_or_else(|| ShipyardError::NotFound(format!("no application for {}", reference)))?;

        if !app.created_successfully {
            return Err(ShipyardError::Validation(format!(
                "application {} was not created successfully",
                app.name
            )));
        }
        Ok(app)
    }

    fn lock_for(&self, application_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(application_id).or_default().clone()
    }

    /// Generated path not claimed by another application or present on disk
    async fn unused_workspace_path(&self, repo_url: &str) -> Result<PathBuf, ShipyardError> {
        for _ in 0..WORKSPACE_PATH_ATTEMPTS {
            let candidate = generate_workspace_path(&self.settings.stacks_base_dir, repo_url);
            let claimed = self.store.get_application_by_directory(&candidate).await?.is_some();
            if !claimed && tokio::fs::metadata(&candidate).await.is_err() {
                return Ok(candidate);
            }
        }
        Err(ShipyardError::ResourceConflict(format!(
            "no free workspace path under {}",
            self.settings.stacks_base_dir.display()
        )))
    }
}

//! Application (stack) models

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Commands run while deploying an application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commands {
    /// Build step, run through `bash -c` before (re)starting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,

    /// Start command handed to the process supervisor
    pub start: String,

    /// Post-deploy hook, run through `bash -c` after (re)starting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<String>,
}

/// A registered deployable application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,

    /// Generated external identifier
    pub uuid: String,

    pub name: String,

    /// Workspace directory, assigned once at creation
    pub directory: PathBuf,

    /// Stack type, e.g. "nodejs"
    #[serde(rename = "type")]
    pub stack_type: String,

    pub repo_url: String,
    pub branch: String,
    pub remote: String,
    pub port: u16,
    pub commands: Commands,

    /// Workspace provisioning (directory + clone) completed
    #[serde(default)]
    pub created_successfully: bool,

    /// At least one deployment has completed
    #[serde(default)]
    pub initial_deployment_success: bool,

    pub created_at: String,
}

/// Fields of an application to persist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewApplication {
    pub name: String,
    pub directory: PathBuf,
    pub stack_type: String,
    pub repo_url: String,
    pub branch: String,
    pub remote: String,
    pub port: u16,
    pub commands: Commands,
}

/// Partial update; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationUpdate {
    pub name: Option<String>,
    pub repo_url: Option<String>,
    pub branch: Option<String>,
    pub remote: Option<String>,
    pub created_successfully: Option<bool>,
    pub initial_deployment_success: Option<bool>,
}

impl ApplicationUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the update in place
    pub fn apply(self, app: &mut Application) {
        if let Some(name) = self.name {
            app.name = name;
        }
        if let Some(repo_url) = self.repo_url {
            app.repo_url = repo_url;
        }
        if let Some(branch) = self.branch {
            app.branch = branch;
        }
        if let Some(remote) = self.remote {
            app.remote = remote;
        }
        if let Some(flag) = self.created_successfully {
            app.created_successfully = flag;
        }
        if let Some(flag) = self.initial_deployment_success {
            app.initial_deployment_success = flag;
        }
    }
}

//! Inputs accepted by the orchestrator

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Commands supplied when creating an application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsRequest {
    pub build: Option<String>,
    pub start: Option<String>,
    pub post: Option<String>,
}

/// Request to register and provision a new application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateApplicationRequest {
    #[serde(rename = "type")]
    pub stack_type: String,
    pub repo_url: String,
    pub port: u16,

    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub remote: Option<String>,
    #[serde(default)]
    pub commands: CommandsRequest,
}

/// Per-deployment overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployOptions {
    pub branch: Option<String>,
    pub remote: Option<String>,

    /// Deploy this commit instead of the branch tip
    pub git_hash: Option<String>,

    /// Hard-reset before pulling; falls back to the configured default
    pub git_reset: Option<bool>,
}

/// How a caller names the application to deploy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppReference {
    /// Workspace directory (CLI)
    Directory(PathBuf),

    /// Numeric id (HTTP service)
    Id(i64),
}

impl std::fmt::Display for AppReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppReference::Directory(dir) => write!(f, "directory {}", dir.display()),
            AppReference::Id(id) => write!(f, "id {}", id),
        }
    }
}

/// Trimmed value, `None` when blank
pub fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

//! Deployment models

use serde::{Deserialize, Serialize};

/// Status of a deployment attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    InProgress,
    Success,
    Failed,
}

impl DeploymentStatus {
    /// Success and failure are final
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeploymentStatus::InProgress)
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeploymentStatus::InProgress => "in_progress",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One tracked attempt to deploy an application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: i64,
    pub application_id: i64,
    pub status: DeploymentStatus,

    /// HEAD after the git sync step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,

    /// Deployment this attempt rolled back from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolled_back_from: Option<i64>,

    pub deployed_at: String,
}

/// Partial deployment update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentUpdate {
    pub status: Option<DeploymentStatus>,
    pub commit_hash: Option<String>,
    pub rolled_back_from: Option<i64>,
}

impl DeploymentUpdate {
    pub fn status(status: DeploymentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn commit_hash(hash: impl Into<String>) -> Self {
        Self {
            commit_hash: Some(hash.into()),
            ..Default::default()
        }
    }
}

/// Captured transcript of one deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentLog {
    pub id: i64,
    pub deployment_id: i64,
    pub log: String,
}

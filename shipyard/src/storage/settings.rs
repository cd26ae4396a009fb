//! Settings file management
//!
//! Settings are read once at process start and passed by value to the
//! components that need them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::ShipyardError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_level: LogLevel,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Git defaults applied when a request leaves them out
    #[serde(default)]
    pub git: GitSettings,

    /// Directory under which new workspaces are created
    #[serde(default = "default_stacks_base_dir")]
    pub stacks_base_dir: PathBuf,

    /// Stack types accepted by `create_application`
    #[serde(default = "default_valid_stacks")]
    pub valid_stacks: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_stacks_base_dir() -> PathBuf {
    PathBuf::from("/var/www/sites")
}

fn default_valid_stacks() -> Vec<String> {
    vec!["nodejs".to_string()]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            server: ServerSettings::default(),
            git: GitSettings::default(),
            stacks_base_dir: default_stacks_base_dir(),
            valid_stacks: default_valid_stacks(),
        }
    }
}

impl Settings {
    pub fn is_valid_stack(&self, stack_type: &str) -> bool {
        self.valid_stacks.iter().any(|s| s == stack_type)
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Git defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSettings {
    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default = "default_remote")]
    pub remote: String,

    /// Hard-reset to the remote branch before pulling
    #[serde(default = "default_true")]
    pub reset: bool,
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            branch: default_branch(),
            remote: default_remote(),
            reset: true,
        }
    }
}

/// Read settings, reporting a missing file as a configuration error
pub async fn load_settings(settings_file: &File) -> Result<Settings, ShipyardError> {
    if !settings_file.exists().await {
        return Err(ShipyardError::Config(format!(
            "settings file {} not found, run `shipyard init` first",
            settings_file.path().display()
        )));
    }
    settings_file
        .read_json()
        .await
        .map_err(|e| ShipyardError::Config(format!("invalid settings file: {}", e)))
}

pub async fn save_settings(settings_file: &File, settings: &Settings) -> Result<(), ShipyardError> {
    settings_file.write_json(settings).await
}

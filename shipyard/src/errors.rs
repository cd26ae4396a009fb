//! Error types for shipyard

use thiserror::Error;

use crate::command::CommandError;

/// Main error type for the deployment engine
#[derive(Error, Debug)]
pub enum ShipyardError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Repository access error: {0}")]
    Access(String),

    #[error("Resource conflict: {0}")]
    ResourceConflict(String),

    #[error("Git error: `git {command}` failed: {message}")]
    Git { command: String, message: String },

    #[error("Process error: {0}")]
    Process(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShipyardError {
    /// Wrap a failed git sub-command
    pub fn git(command: impl Into<String>, message: impl ToString) -> Self {
        ShipyardError::Git {
            command: command.into(),
            message: message.to_string(),
        }
    }

    /// Wrap a failed supervisor or build command with context
    pub fn process(context: &str, err: CommandError) -> Self {
        ShipyardError::Process(format!("{}: {}", context, err))
    }
}

impl From<anyhow::Error> for ShipyardError {
    fn from(err: anyhow::Error) -> Self {
        ShipyardError::Internal(err.to_string())
    }
}

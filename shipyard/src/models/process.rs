//! Process supervisor registration

use serde::{Deserialize, Serialize};

use crate::errors::ShipyardError;

/// Supervisor registration for an application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRegistration {
    pub id: i64,
    pub application_id: i64,

    /// Name the supervisor knows the process by
    pub name: String,

    /// Launch script in `<executable> -- <args>` form
    pub script: String,
}

impl ProcessRegistration {
    /// Script split into supervisor arguments
    pub fn script_args(&self) -> Vec<String> {
        self.script.split_whitespace().map(str::to_string).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProcessRegistration {
    pub application_id: i64,
    pub name: String,
    pub script: String,
}

impl NewProcessRegistration {
    /// Derive a registration from a start command such as `npm run serve`
    pub fn from_start_command(
        application_id: i64,
        name: &str,
        start_command: &str,
    ) -> Result<Self, ShipyardError> {
        let mut parts = start_command.split_whitespace();
        let executable = parts.next().ok_or_else(|| {
            ShipyardError::Validation("start command is empty".to_string())
        })?;
        let rest: Vec<&str> = parts.collect();

        let script = if rest.is_empty() {
            executable.to_string()
        } else {
            format!("{} -- {}", executable, rest.join(" "))
        };

        Ok(Self {
            application_id,
            name: name.to_string(),
            script,
        })
    }
}

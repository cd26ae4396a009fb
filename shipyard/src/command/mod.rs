//! External command execution

pub mod runner;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::sink::LogSink;

pub use runner::ProcessRunner;

/// Failure of a single external command
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("could not run `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed ({status}): {}", .stderr.trim())]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Description of one program invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Run a script through `bash -c`
    pub fn shell(script: &str) -> Self {
        Self::new("bash").args(["-c", script])
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Program and arguments joined by spaces, without environment
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{}={} ", key, value)?;
        }
        write!(f, "{}", self.command_line())
    }
}

/// Runs commands, streaming their output into a sink
///
/// Returns the combined stdout/stderr text on success. Implementations must
/// not return before both output streams are fully drained and the child has
/// exited.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &CommandSpec, sink: &dyn LogSink) -> Result<String, CommandError>;
}

//! Child-process backed command executor

use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

use super::{CommandError, CommandExecutor, CommandSpec};
use crate::sink::LogSink;

/// Executes commands as child processes of the engine
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for ProcessRunner {
    async fn run(&self, command: &CommandSpec, sink: &dyn LogSink) -> Result<String, CommandError> {
        let shown = command.to_string();
        sink.emit(&format!("> Executing: {}", shown));
        debug!("Running command: {}", shown);

        let io_err = |source: std::io::Error| CommandError::Io {
            command: command.command_line(),
            source,
        };

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(&command.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &command.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(io_err)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io_err(std::io::Error::other("stdout not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io_err(std::io::Error::other("stderr not captured")))?;

        // Both pipes are drained concurrently so a full one cannot stall the child
        let merged = Mutex::new(String::new());
        let (stdout_res, stderr_res) = tokio::join!(
            drain(stdout, sink, &merged),
            drain(stderr, sink, &merged),
        );
        let status = child.wait().await.map_err(io_err)?;
        stdout_res.map_err(io_err)?;
        let stderr_text = stderr_res.map_err(io_err)?;

        let output = merged.into_inner().unwrap_or_else(|e| e.into_inner());
        if !status.success() {
            return Err(CommandError::Failed {
                command: command.command_line(),
                status: status.to_string(),
                stderr: stderr_text,
            });
        }

        Ok(output)
    }
}

/// Forward every line of `reader` to the sink and the shared buffer.
/// Returns the text read from this stream alone.
async fn drain<R>(reader: R, sink: &dyn LogSink, merged: &Mutex<String>) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut own = String::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let text = String::from_utf8_lossy(&buf);
        let line = text.trim_end_matches(['\n', '\r']);

        sink.emit(line);
        own.push_str(line);
        own.push('\n');

        let mut merged = merged.lock().unwrap_or_else(|e| e.into_inner());
        merged.push_str(line);
        merged.push('\n');
    }

    Ok(own)
}

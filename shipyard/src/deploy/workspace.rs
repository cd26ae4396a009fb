//! Application workspaces

use std::path::{Path, PathBuf};

use crate::command::CommandSpec;
use crate::errors::ShipyardError;
use crate::filesys::dir::Dir;
use crate::sink::LogSink;

/// Longest slug kept from a repository name
pub const SLUG_MAX_LEN: usize = 30;

/// Length of the random suffix that keeps workspace paths unique
pub const TOKEN_LEN: usize = 3;

/// Repository name from a URL: last path segment without `.git`.
/// Handles scp-style remotes such as `git@host:team/app.git`.
pub fn repo_name(repo_url: &str) -> &str {
    let trimmed = repo_url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    trimmed
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(trimmed)
}

/// Lower-case, collapse non-alphanumeric runs into `-`, cap the length
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug.truncate(SLUG_MAX_LEN);
    slug.trim_matches('-').to_string()
}

/// Fresh workspace path `<base>/<slug>__<token>` for a repository
pub fn generate_workspace_path(base_dir: &Path, repo_url: &str) -> PathBuf {
    let mut slug = slugify(repo_name(repo_url));
    if slug.is_empty() {
        slug.push_str("app");
    }
    let token: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(TOKEN_LEN)
        .collect();

    base_dir.join(format!("{}__{}", slug, token))
}

/// The directory an application is cloned into and deployed from.
///
/// Commands are pointed at the workspace through their working directory;
/// the process-wide current directory is never changed.
#[derive(Debug, Clone)]
pub struct Workspace {
    dir: Dir,
}

impl Workspace {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            dir: Dir::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn dir(&self) -> &Dir {
        &self.dir
    }

    pub async fn create(&self) -> Result<(), ShipyardError> {
        self.dir.create().await
    }

    /// Check the workspace is usable before running commands in it
    pub async fn enter(&self, sink: &dyn LogSink) -> Result<(), ShipyardError> {
        sink.emit("Entering workspace...");
        if !self.dir.exists().await {
            return Err(ShipyardError::NotFound(format!(
                "workspace directory {} does not exist",
                self.path().display()
            )));
        }
        sink.emit(&format!("Working dir: {}", self.path().display()));
        Ok(())
    }

    /// A command that runs inside the workspace
    pub fn command(&self, program: &str) -> CommandSpec {
        CommandSpec::new(program).current_dir(self.path())
    }

    /// A `bash -c` script that runs inside the workspace
    pub fn shell(&self, script: &str) -> CommandSpec {
        CommandSpec::shell(script).current_dir(self.path())
    }
}

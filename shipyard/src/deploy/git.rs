//! Git synchronization of application workspaces

use tracing::{debug, info};

use crate::command::{CommandExecutor, CommandSpec};
use crate::deploy::workspace::Workspace;
use crate::errors::ShipyardError;
use crate::sink::LogSink;

/// Check the repository can be reached without prompting for credentials
pub async fn verify_access(
    executor: &dyn CommandExecutor,
    sink: &dyn LogSink,
    repo_url: &str,
) -> Result<(), ShipyardError> {
    let repo_url = repo_url.trim();
    sink.emit("");
    sink.emit("Verifying git repository access...");

    let spec = CommandSpec::new("git")
        .args(["ls-remote", repo_url])
        .env("GIT_TERMINAL_PROMPT", "0");
    executor
        .run(&spec, sink)
        .await
        .map_err(|e| ShipyardError::Access(format!("cannot reach {}: {}", repo_url, e)))?;

    Ok(())
}

/// How a workspace should be brought up to date
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub branch: String,
    pub remote: String,

    /// Hard-reset to the remote branch tip before pulling
    pub force_reset: bool,

    /// Pin the workspace to this commit instead of the branch tip
    pub commit: Option<String>,
}

/// Result of [`GitSync::update`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Reset to an explicitly requested commit; nothing was pulled
    RolledBack { commit: String },

    /// Already level with the remote branch
    UpToDate { commit: String },

    /// Pulled `behind` new commits
    Pulled { behind: u64, commit: String },
}

impl SyncOutcome {
    /// HEAD after the sync
    pub fn commit(&self) -> &str {
        match self {
            SyncOutcome::RolledBack { commit }
            | SyncOutcome::UpToDate { commit }
            | SyncOutcome::Pulled { commit, .. } => commit,
        }
    }
}

/// Git operations inside one workspace
pub struct GitSync<'a> {
    executor: &'a dyn CommandExecutor,
    sink: &'a dyn LogSink,
    workspace: &'a Workspace,
}

impl<'a> GitSync<'a> {
    pub fn new(
        executor: &'a dyn CommandExecutor,
        sink: &'a dyn LogSink,
        workspace: &'a Workspace,
    ) -> Self {
        Self {
            executor,
            sink,
            workspace,
        }
    }

    async fn git(&self, args: &[&str]) -> Result<String, ShipyardError> {
        let spec = self.workspace.command("git").args(args.iter().copied());
        self.executor
            .run(&spec, self.sink)
            .await
            .map_err(|e| ShipyardError::git(args.join(" "), e))
    }

    /// Clone into the (empty) workspace and check out the branch
    pub async fn clone_repo(
        &self,
        repo_url: &str,
        branch: &str,
        remote: &str,
    ) -> Result<(), ShipyardError> {
        let (repo_url, branch, remote) = (repo_url.trim(), branch.trim(), remote.trim());

        self.sink.emit("");
        self.sink.emit("Cloning repository...");
        self.git(&["clone", "-b", branch, "-o", remote, repo_url, "."])
            .await?;

        // The remote's default branch may differ from the one requested
        self.sink.emit(&format!("Changing git branch to {}", branch));
        self.git(&["checkout", branch]).await?;

        info!("Cloned {} ({}) into {}", repo_url, branch, self.workspace.path().display());
        Ok(())
    }

    /// Current HEAD commit
    pub async fn head(&self) -> Result<String, ShipyardError> {
        Ok(self.git(&["rev-parse", "HEAD"]).await?.trim().to_string())
    }

    /// Number of commits the local branch lacks from `remote/branch`
    pub async fn commits_behind(&self, remote: &str, branch: &str) -> Result<u64, ShipyardError> {
        let range = format!("HEAD..{}/{}", remote, branch);
        let output = self.git(&["rev-list", "--count", &range]).await?;
        output.trim().parse::<u64>().map_err(|_| {
            ShipyardError::git(
                format!("rev-list --count {}", range),
                format!("unexpected output {:?}", output.trim()),
            )
        })
    }

    /// Bring the workspace to the requested state
    pub async fn update(&self, request: &UpdateRequest) -> Result<SyncOutcome, ShipyardError> {
        let branch = request.branch.trim();
        let remote = request.remote.trim();
        let commit = request
            .commit
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());

        let active = self.git(&["branch", "--show-current"]).await?;
        if active.trim() != branch {
            self.sink.emit("");
            self.sink.emit(&format!("Changing git branch to {}", branch));
            self.git(&["checkout", branch]).await?;
        }

        self.sink.emit("");
        self.sink.emit("Checking git status...");
        self.git(&["fetch", "--all", "--tags"]).await?;

        if let Some(commit) = commit {
            self.sink.emit(&format!("Resetting git to commit {}...", commit));
            self.git(&["reset", "--hard", commit]).await?;
            let head = self.head().await?;
            self.sink.emit(&format!("Repository pinned to {}", head));
            return Ok(SyncOutcome::RolledBack { commit: head });
        }

        if request.force_reset {
            self.sink.emit("");
            self.sink.emit("Forcing clean state with git reset...");
            let target = format!("{}/{}", remote, branch);
            self.git(&["reset", "--hard", &target]).await?;
        }

        let behind = self.commits_behind(remote, branch).await?;
        self.sink.emit(&format!("Commits behind remote: {}", behind));
        debug!("Workspace {} is {} commits behind", self.workspace.path().display(), behind);

        if behind == 0 {
            self.sink.emit("");
            self.sink.emit("Repository already up to date.");
            let head = self.head().await?;
            return Ok(SyncOutcome::UpToDate { commit: head });
        }

        self.sink.emit("");
        self.sink.emit("Pulling latest changes...");
        self.git(&["pull", remote, branch]).await?;

        let head = self.head().await?;
        self.sink.emit(&format!("Repository updated to {}", head));
        Ok(SyncOutcome::Pulled {
            behind,
            commit: head,
        })
    }
}

//! PM2 process supervisor reconciliation

use serde::Deserialize;
use tracing::{info, warn};

use crate::command::CommandExecutor;
use crate::deploy::workspace::Workspace;
use crate::errors::ShipyardError;
use crate::models::{Application, NewProcessRegistration, ProcessRegistration};
use crate::sink::{LogSink, NullSink};
use crate::store::Store;

/// Process state as reported by `pm2 jlist`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Online,
    Stopping,
    Stopped,
    Launching,
    Errored,
    #[serde(rename = "one-launch-status")]
    OneLaunchStatus,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pm2Env {
    #[serde(default)]
    pub status: ProcessStatus,
}

/// One entry of `pm2 jlist`; every other field is ignored
#[derive(Debug, Clone, Deserialize)]
pub struct Pm2Process {
    pub name: String,
    #[serde(default)]
    pub pm2_env: Pm2Env,
}

/// Decode `pm2 jlist` output. PM2 may print `[PM2] ...` banner lines before
/// the JSON, so each `[` is tried in turn until one opens a process list.
pub fn parse_process_list(output: &str) -> Result<Vec<Pm2Process>, ShipyardError> {
    let mut last_error = None;
    for (start, _) in output.match_indices('[') {
        let mut stream =
            serde_json::Deserializer::from_str(&output[start..]).into_iter::<Vec<Pm2Process>>();
        match stream.next() {
            Some(Ok(processes)) => return Ok(processes),
            Some(Err(e)) => last_error = Some(e),
            None => {}
        }
    }
    Err(match last_error {
        Some(e) => ShipyardError::Process(format!("could not decode pm2 jlist: {}", e)),
        None => ShipyardError::Process("pm2 jlist returned no process list".into()),
    })
}

/// Check the named process is online
pub fn require_online(processes: &[Pm2Process], name: &str) -> Result<(), ShipyardError> {
    match processes.iter().find(|p| p.name == name) {
        Some(p) if p.pm2_env.status == ProcessStatus::Online => Ok(()),
        Some(p) => Err(ShipyardError::Process(format!(
            "process {} is {:?}, expected online",
            name, p.pm2_env.status
        ))),
        None => Err(ShipyardError::Process(format!(
            "process {} is not registered with pm2",
            name
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Yarn,
    Pnpm,
}

impl PackageManager {
    const LOCKFILES: [(&'static str, PackageManager); 3] = [
        ("package-lock.json", PackageManager::Npm),
        ("yarn.lock", PackageManager::Yarn),
        ("pnpm-lock.yaml", PackageManager::Pnpm),
    ];

    /// Detect by lockfile, first match wins
    pub async fn detect(workspace: &Workspace) -> Result<Self, ShipyardError> {
        for (lockfile, manager) in Self::LOCKFILES {
            if workspace.dir().file(lockfile).exists().await {
                return Ok(manager);
            }
        }
        Err(ShipyardError::Process(format!(
            "no lockfile found in {}",
            workspace.path().display()
        )))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Yarn => "yarn",
            PackageManager::Pnpm => "pnpm",
        }
    }
}

/// Brings the supervisor in line with an application after its code changed
pub struct Pm2Reconciler<'a> {
    executor: &'a dyn CommandExecutor,
    store: &'a dyn Store,
    sink: &'a dyn LogSink,
    workspace: &'a Workspace,
}

impl<'a> Pm2Reconciler<'a> {
    pub fn new(
        executor: &'a dyn CommandExecutor,
        store: &'a dyn Store,
        sink: &'a dyn LogSink,
        workspace: &'a Workspace,
    ) -> Self {
        Self {
            executor,
            store,
            sink,
            workspace,
        }
    }

    pub async fn reconcile(&self, app: &Application) -> Result<(), ShipyardError> {
        let first_deploy = !app.initial_deployment_success;

        self.sink.emit("");
        self.sink.emit("Checking pm2...");
        self.executor
            .run(&self.workspace.command("pm2").arg("--version"), self.sink)
            .await
            .map_err(|e| ShipyardError::process("pm2 is not installed", e))?;

        let manager = PackageManager::detect(self.workspace).await?;
        self.sink
            .emit(&format!("Using package manager: {}", manager.as_str()));

        if let Some(build) = non_empty(app.commands.build.as_deref()) {
            self.sink.emit("");
            self.sink.emit("Building application...");
            self.executor
                .run(&self.workspace.shell(build), self.sink)
                .await
                .map_err(|e| ShipyardError::process("build failed", e))?;
        }

        let registration = self.registration(app).await?;

        self.sink.emit("");
        if first_deploy {
            self.sink.emit("Starting application...");
            let spec = self
                .workspace
                .command("pm2")
                .args(["start", "--name", registration.name.as_str()])
                .args(registration.script_args());
            self.executor
                .run(&spec, self.sink)
                .await
                .map_err(|e| ShipyardError::process("pm2 start failed", e))?;
        } else {
            self.sink.emit("Restarting application...");
            let spec = self
                .workspace
                .command("pm2")
                .args(["restart", registration.name.as_str()]);
            self.executor
                .run(&spec, self.sink)
                .await
                .map_err(|e| ShipyardError::process("pm2 restart failed", e))?;
        }

        if let Some(post) = non_empty(app.commands.post.as_deref()) {
            self.sink.emit("");
            self.sink.emit("Running post-deploy command...");
            self.executor
                .run(&self.workspace.shell(post), self.sink)
                .await
                .map_err(|e| ShipyardError::process("post-deploy command failed", e))?;
        }

        self.sink.emit("");
        self.sink.emit("Checking process status...");
        let output = self
            .executor
            .run(&self.workspace.command("pm2").arg("jlist"), &NullSink)
            .await
            .map_err(|e| ShipyardError::process("pm2 jlist failed", e))?;
        require_online(&parse_process_list(&output)?, &registration.name)?;
        self.sink
            .emit(&format!("Process {} is online", registration.name));

        if first_deploy {
            let save = self.workspace.command("pm2").arg("save");
            if let Err(e) = self.executor.run(&save, self.sink).await {
                warn!("pm2 save failed for {}: {}", registration.name, e);
                self.sink.emit(&format!("Warning: pm2 save failed: {}", e));
            }
        }

        info!("Reconciled pm2 process {} (first deploy: {})", registration.name, first_deploy);
        Ok(())
    }

    /// Registration for the application, created on first use
    async fn registration(&self, app: &Application) -> Result<ProcessRegistration, ShipyardError> {
        if let Some(existing) = self.store.get_process_by_application(app.id).await? {
            return Ok(existing);
        }

        let new = NewProcessRegistration::from_start_command(app.id, &app.name, &app.commands.start)?;
        self.store.create_process(new).await?;
        self.store
            .get_process_by_application(app.id)
            .await?
            .ok_or_else(|| {
                ShipyardError::Persistence(format!("process registration for {} was not saved", app.name))
            })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

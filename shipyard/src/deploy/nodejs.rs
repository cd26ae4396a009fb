//! Node.js stack step

use crate::command::CommandExecutor;
use crate::deploy::pm2::Pm2Reconciler;
use crate::deploy::workspace::Workspace;
use crate::errors::ShipyardError;
use crate::models::Application;
use crate::sink::LogSink;
use crate::store::Store;

/// Check the runtime is installed, then reconcile the pm2 process
pub async fn deploy_nodejs(
    executor: &dyn CommandExecutor,
    store: &dyn Store,
    sink: &dyn LogSink,
    workspace: &Workspace,
    app: &Application,
) -> Result<(), ShipyardError> {
    sink.emit("");
    sink.emit("Checking nodejs...");
    executor
        .run(&workspace.command("node").arg("--version"), sink)
        .await
        .map_err(|e| ShipyardError::process("nodejs is not installed", e))?;

    Pm2Reconciler::new(executor, store, sink, workspace)
        .reconcile(app)
        .await
}

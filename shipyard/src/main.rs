//! Shipyard - Entry Point
//!
//! Registers git-hosted applications, deploys them under pm2, and serves the
//! same operations over HTTP.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use colored::Colorize;
use tracing::info;

use shipyard::app::run::run_server;
use shipyard::app::state::AppState;
use shipyard::deploy::{AppReference, CommandsRequest, CreateApplicationRequest, DeployOptions};
use shipyard::logs::{init_logging, LogOptions};
use shipyard::sink::{CaptureSink, ConsoleSink, LogSink, MultiSink};
use shipyard::storage::layout::StorageLayout;
use shipyard::storage::settings::{load_settings, save_settings, Settings};
use shipyard::store::JsonStore;
use shipyard::utils::version_info;

const USAGE: &str = "usage: shipyard <init|add|deploy|serve> [--key=value ...]

  init   [--force]
  add    --tech=nodejs --repo=<url> --port=<port> [--name= --branch= --git-remote= --build= --start= --post=]
  deploy [--dir=./ --branch= --git-remote= --git-hash= --git-reset=true|false]
  serve
  --version";

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut command: Option<String> = None;
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        } else if command.is_none() {
            command = Some(arg.clone());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("{}", e),
        }
        return ExitCode::SUCCESS;
    }

    let layout = StorageLayout::default();
    let result = match command.as_deref() {
        Some("init") => init(&layout, &cli_args).await,
        Some("add") => add(&layout, &cli_args).await,
        Some("deploy") => deploy(&layout, &cli_args).await,
        Some("serve") => serve(&layout).await,
        Some(other) => Err(anyhow!("unknown command `{}`\n\n{}", other, USAGE)),
        None => Err(anyhow!(USAGE)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn init(layout: &StorageLayout, cli_args: &HashMap<String, String>) -> anyhow::Result<()> {
    let force = flag(cli_args, "force")?.unwrap_or(false);

    layout.setup().await.context("failed to create storage directory")?;

    let settings_file = layout.settings_file();
    if settings_file.exists().await && !force {
        println!(
            "{} {} already exists, use --force to overwrite",
            "Skipped:".yellow(),
            settings_file.path().display()
        );
    } else {
        save_settings(&settings_file, &Settings::default()).await?;
        println!("{} wrote {}", "Done:".green(), settings_file.path().display());
    }

    let store = JsonStore::open(layout.store_file()).await?;
    store.flush().await?;
    println!("{} store at {}", "Done:".green(), layout.store_file().path().display());
    Ok(())
}

async fn add(layout: &StorageLayout, cli_args: &HashMap<String, String>) -> anyhow::Result<()> {
    let settings = load_cli_settings(layout).await?;

    let request = CreateApplicationRequest {
        stack_type: required(cli_args, "tech")?,
        repo_url: required(cli_args, "repo")?,
        port: required(cli_args, "port")?
            .parse::<u16>()
            .context("--port must be a number between 1 and 65535")?,
        name: cli_args.get("name").cloned(),
        branch: cli_args.get("branch").cloned(),
        remote: cli_args.get("git-remote").cloned(),
        commands: CommandsRequest {
            build: cli_args.get("build").cloned(),
            start: cli_args.get("start").cloned(),
            post: cli_args.get("post").cloned(),
        },
    };

    let state = AppState::init(layout, settings).await?;
    let app = state
        .orchestrator
        .create_application(request, &ConsoleSink)
        .await?;

    println!();
    println!(
        "{} created {} (id {}) in {}",
        "Success:".green().bold(),
        app.name,
        app.id,
        app.directory.display()
    );
    Ok(())
}

async fn deploy(layout: &StorageLayout, cli_args: &HashMap<String, String>) -> anyhow::Result<()> {
    let settings = load_cli_settings(layout).await?;

    let dir = cli_args.get("dir").map(String::as_str).unwrap_or("./");
    let dir = tokio::fs::canonicalize(dir)
        .await
        .with_context(|| format!("cannot resolve directory {}", dir))?;

    let options = DeployOptions {
        branch: cli_args.get("branch").cloned(),
        remote: cli_args.get("git-remote").cloned(),
        git_hash: cli_args.get("git-hash").cloned(),
        git_reset: flag(cli_args, "git-reset")?,
    };

    let state = AppState::init(layout, settings).await?;
    let capture = CaptureSink::new();
    let sink = MultiSink::default()
        .with(Arc::new(ConsoleSink))
        .with(Arc::new(capture.clone()));

    let result = state
        .orchestrator
        .deploy_application(&AppReference::Directory(dir), options, &sink)
        .await;

    let (deployment_id, outcome) = match result {
        Ok(id) => (Some(id), Ok(id)),
        Err(failure) => (failure.deployment_id, Err(failure.error)),
    };

    if let Some(deployment_id) = deployment_id {
        if let Err(e) = state
            .orchestrator
            .save_transcript(deployment_id, capture.transcript())
            .await
        {
            eprintln!("{} could not save deployment log: {}", "Warning:".yellow(), e);
        }
    }

    let deployment_id = outcome?;
    sink.flush();
    println!();
    println!("{} deployment {} finished", "Success:".green().bold(), deployment_id);
    Ok(())
}

async fn serve(layout: &StorageLayout) -> anyhow::Result<()> {
    let settings = load_settings(&layout.settings_file()).await?;

    layout.logs_dir().create().await?;
    let _guard = init_logging(LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: Some(layout.logs_dir().path().to_path_buf()),
        ..Default::default()
    })?;

    info!("Running shipyard {}", version_info().version);
    run_server(layout, settings, await_shutdown_signal()).await?;
    Ok(())
}

/// Settings plus stderr logging for one-shot commands
async fn load_cli_settings(layout: &StorageLayout) -> anyhow::Result<Settings> {
    let settings = load_settings(&layout.settings_file()).await?;
    if let Err(e) = init_logging(LogOptions {
        log_level: settings.log_level.clone(),
        ..Default::default()
    }) {
        eprintln!("Failed to initialize logging: {e}");
    }
    Ok(settings)
}

fn required(cli_args: &HashMap<String, String>, key: &str) -> anyhow::Result<String> {
    match cli_args.get(key).map(|v| v.trim()) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => bail!("missing required argument --{}=<value>", key),
    }
}

fn flag(cli_args: &HashMap<String, String>, key: &str) -> anyhow::Result<Option<bool>> {
    cli_args
        .get(key)
        .map(|v| {
            v.parse::<bool>()
                .with_context(|| format!("--{} must be true or false", key))
        })
        .transpose()
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                let _ = tokio::signal::ctrl_c().await;
                info!("Ctrl+C received, shutting down...");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down...");
    }
}

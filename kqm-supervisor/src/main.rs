//! Karaoke queue manager supervisor (kqm-supervisor) - Main entry point
//!
//! Prepares the root folder and library database, starts the web server
//! worker, and relays messages between it and the on-demand media scanner
//! until a shutdown signal arrives or the server exits.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use kqm_common::config::{
    default_config_path, load_toml_config, RootFolderInitializer, RootFolderResolver,
    ROOT_FOLDER_ENV,
};
use kqm_common::db::init_database;
use kqm_supervisor::{LogPresenter, ProcessLauncher, Supervisor, WorkerKind, WorkerStatus};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable naming the runtime environment passed to workers
const ENV_NAME_ENV: &str = "KQM_ENV";

/// Environment variable carrying the resolved database path to workers
const DATABASE_ENV: &str = "KQM_DATABASE";

/// Command-line arguments for kqm-supervisor
#[derive(Parser, Debug)]
#[command(name = "kqm-supervisor")]
#[command(about = "Process supervisor for the karaoke queue manager")]
#[command(version)]
struct Args {
    /// Path to the TOML config file (defaults to the per-user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root folder holding the library database
    #[arg(short, long, env = "KQM_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Log status reports from the server (e.g. the connection URL)
    #[arg(long)]
    host_status: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);
    let config = match &config_path {
        Some(path) => load_toml_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Default::default(),
    };

    // Initialize tracing (RUST_LOG wins over the config file)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting kqm-supervisor v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }

    let root_folder = RootFolderResolver::new()
        .with_cli_arg(args.root_folder.clone())
        .with_config(&config)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to create root folder")?;
    info!("Root folder: {}", initializer.root_folder().display());

    // Create or upgrade the schema once, before any worker opens the file
    let db_path = initializer.database_path(config.database_file());
    let pool = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;
    pool.close().await;

    let env_name = std::env::var(ENV_NAME_ENV).unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "development".to_string()
        } else {
            "production".to_string()
        }
    });
    info!("Environment: {}", env_name);

    let launcher = ProcessLauncher::new(&config.workers)
        .with_env(ENV_NAME_ENV, env_name)
        .with_env(ROOT_FOLDER_ENV, initializer.root_folder().to_string_lossy())
        .with_env(DATABASE_ENV, db_path.to_string_lossy());

    let (supervisor, events) = Supervisor::new(launcher);
    let mut supervisor = if args.host_status {
        supervisor.with_presenter(Box::new(LogPresenter))
    } else {
        supervisor
    };

    supervisor.start_server();
    if supervisor.status(WorkerKind::Server) != WorkerStatus::Running {
        anyhow::bail!("Web server worker could not be started");
    }
    supervisor.run(events, shutdown_signal()).await;

    info!("Supervisor shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

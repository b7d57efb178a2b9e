//! finproc-api - Finance document processing service
//!
//! Accepts uploaded finance exports, binds them to the roles a job
//! expects, runs the matching computation script and returns its artifact.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use finproc_api::jobs::WorkbookInspector;
use finproc_api::AppState;
use finproc_common::config::{load_toml_config, ConfigOverrides, ServiceConfig};

/// Command-line arguments for finproc-api
#[derive(Parser, Debug)]
#[command(name = "finproc-api")]
#[command(about = "Finance document processing service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "FINPROC_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory holding the computation scripts
    #[arg(long)]
    scripts_dir: Option<PathBuf>,

    /// Interpreter used to run the scripts
    #[arg(long)]
    interpreter: Option<String>,

    /// Parent directory for per-job workspaces
    #[arg(long)]
    workspace_root: Option<PathBuf>,

    /// Leave workspaces on disk after each job
    #[arg(long)]
    keep_workspaces: bool,

    /// Kill computations running longer than this (0 = never)
    #[arg(long)]
    computation_timeout_secs: Option<u64>,

    /// Maximum number of jobs processed at once
    #[arg(long)]
    max_concurrent_jobs: Option<usize>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            bind_address: self.bind.clone(),
            port: self.port,
            scripts_dir: self.scripts_dir.clone(),
            interpreter: self.interpreter.clone(),
            workspace_root: self.workspace_root.clone(),
            keep_workspaces: self.keep_workspaces.then_some(true),
            computation_timeout_secs: self.computation_timeout_secs,
            max_concurrent_jobs: self.max_concurrent_jobs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml = load_toml_config(args.config.as_deref()).context("Failed to load configuration")?;
    let config = ServiceConfig::resolve(&args.overrides(), toml.as_ref())
        .context("Invalid configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting finproc-api (Finance Processing)");
    if toml.is_none() {
        info!("No configuration file loaded; using environment and defaults");
    }
    info!(
        "Version: {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Scripts: {} via {}", config.scripts_dir.display(), config.interpreter);
    info!("Workspaces: {}", config.workspace_root.display());
    if let Some(timeout) = config.computation_timeout {
        info!("Computation timeout: {}s", timeout.as_secs());
    }
    if let Some(limit) = config.max_concurrent_jobs {
        info!("Concurrent job limit: {}", limit);
    }

    let addr = format!("{}:{}", config.bind_address, config.port);
    let state = AppState::new(config, Arc::new(WorkbookInspector));
    let app = finproc_api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
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

//! farmscope - DAQ farm dashboard engine
//!
//! Hosts the dashboard event loop behind the scene/gesture HTTP API.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: backend http://127.0.0.1:5010, API on 127.0.0.1:8080
//! cargo run --release
//!
//! # Explicit config and backend
//! ./farmscope --config farmscope.toml --backend http://analytics:5010
//!
//! # Dump the effective configuration
//! ./farmscope --print-config
//! ```
//!
//! # Environment Variables
//!
//! - `FARMSCOPE_CONFIG`: Path to the TOML config (when `--config` is not given)
//! - `FARMSCOPE_CORS_ORIGINS`: Comma-separated allowed front-end origins
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use farmscope::api::{create_app, AppState};
use farmscope::backend::{AnalyticsBackend, HttpBackend};
use farmscope::config::{self, DashboardConfig};
use farmscope::dashboard::spawn_dashboard;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "farmscope")]
#[command(about = "Linked multi-view dashboard engine for DAQ farm monitoring")]
#[command(version)]
struct CliArgs {
    /// Path to the TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the API bind address (default: "127.0.0.1:8080")
    #[arg(short, long, value_name = "HOST:PORT")]
    addr: Option<String>,

    /// Override the analytics backend base URL
    #[arg(short, long, value_name = "URL")]
    backend: Option<String>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "FARMSCOPE_LOG_JSON")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

/// Config from `--config`, else the standard search order, then CLI overrides.
fn load_config(args: &CliArgs) -> Result<DashboardConfig> {
    let mut cfg = match &args.config {
        Some(path) => DashboardConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => DashboardConfig::load(),
    };
    if let Some(addr) = &args.addr {
        cfg.server.addr = addr.clone();
    }
    if let Some(url) = &args.backend {
        cfg.backend.base_url = url.clone();
    }
    cfg.validate().context("Invalid configuration after CLI overrides")?;
    Ok(cfg)
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.log_json);

    let cfg = load_config(&args)?;
    if args.print_config {
        print!("{}", cfg.to_toml()?);
        return Ok(());
    }
    config::init(cfg.clone());

    info!("farmscope {}", env!("CARGO_PKG_VERSION"));
    info!(backend = %cfg.backend.base_url, timeout_secs = cfg.backend.timeout_secs, "Analytics backend");
    info!(
        dimensions = ?cfg.selection.default_dimensions,
        debounce_ms = cfg.anomaly.debounce_ms,
        "Dashboard defaults"
    );

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let backend: Arc<dyn AnalyticsBackend> =
        Arc::new(HttpBackend::new(&cfg.backend).context("Failed to build backend client")?);
    let backend_name = backend.name().to_string();
    let addr = cfg.server.addr.clone();

    let (handle, loop_task) = spawn_dashboard(cfg, backend, cancel_token.clone());
    let app = create_app(AppState::new(handle, backend_name));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %addr, "API listening on http://{}/api/v1", addr);

    let server_token = cancel_token.clone();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            server_token.cancelled().await;
            info!("[HttpServer] Received shutdown signal");
        })
        .await;

    // Stop the loop if the server exited on its own.
    cancel_token.cancel();
    if let Err(e) = loop_task.await {
        error!(error = %e, "Dashboard event loop task failed");
    }

    match result {
        Ok(()) => {
            info!("Graceful shutdown complete");
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("HTTP server error: {}", e)),
    }
}

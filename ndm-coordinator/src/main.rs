//! ndm-coordinator - nzbdav to Radarr/Sonarr migration service
//!
//! Reads the legacy nzbdav catalog, triggers re-downloads in Radarr/Sonarr in
//! paced batches, and serves progress to the dashboard over HTTP + SSE.

use anyhow::{Context, Result};
use clap::Parser;
use ndm_common::config::{ConfigOverrides, TomlConfig};
use ndm_common::{AppConfig, EventBus};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ndm_coordinator::catalog::SqliteCatalogReader;
use ndm_coordinator::db::{open_ledger_pool, StatusLedger};
use ndm_coordinator::remote::ArrClient;
use ndm_coordinator::services::{BatchOrchestrator, OrchestratorSettings};
use ndm_coordinator::AppState;

/// Command-line arguments for ndm-coordinator
#[derive(Parser, Debug)]
#[command(name = "ndm-coordinator")]
#[command(about = "Migrates nzbdav catalog items into Radarr/Sonarr re-downloads")]
#[command(version)]
struct Args {
    /// TOML config file (default: <config dir>/ndm/config.toml)
    #[arg(long, env = "NDM_CONFIG")]
    config: Option<PathBuf>,

    /// Legacy nzbdav catalog database (opened read-only)
    #[arg(long, env = "NZB_DB")]
    catalog: Option<PathBuf>,

    /// Status ledger database
    #[arg(long, env = "STATUS_DB")]
    ledger: Option<PathBuf>,

    #[arg(long, env = "RADARR_URL")]
    radarr_url: Option<String>,

    #[arg(long, env = "RADARR_API_KEY", hide_env_values = true)]
    radarr_api_key: Option<String>,

    #[arg(long, env = "SONARR_URL")]
    sonarr_url: Option<String>,

    #[arg(long, env = "SONARR_API_KEY", hide_env_values = true)]
    sonarr_api_key: Option<String>,

    /// Items per batch when a request names no size
    #[arg(long, env = "BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Hard ceiling on items per batch
    #[arg(long, env = "MAX_BATCH_SIZE")]
    max_batch_size: Option<usize>,

    /// Minimum seconds between consecutive manager calls
    #[arg(long, env = "API_DELAY")]
    api_delay: Option<f64>,

    /// Per-request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT")]
    request_timeout: Option<f64>,

    /// Delete whole seasons in Sonarr even for single-episode releases
    #[arg(long, env = "SONARR_DELETE_WHOLE_SEASON", value_parser = clap::builder::BoolishValueParser::new())]
    sonarr_delete_whole_season: Option<bool>,

    #[arg(long, env = "HOST")]
    host: Option<String>,

    #[arg(short, long, env = "PORT")]
    port: Option<u16>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            catalog_path: self.catalog.clone(),
            ledger_path: self.ledger.clone(),
            radarr_url: self.radarr_url.clone(),
            radarr_api_key: self.radarr_api_key.clone(),
            sonarr_url: self.sonarr_url.clone(),
            sonarr_api_key: self.sonarr_api_key.clone(),
            batch_size: self.batch_size,
            max_batch_size: self.max_batch_size,
            api_delay: self.api_delay,
            request_timeout: self.request_timeout,
            sonarr_delete_whole_season: self.sonarr_delete_whole_season,
            host: self.host.clone(),
            port: self.port,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting ndm-coordinator v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let file = TomlConfig::load(args.config.as_deref()).context("Failed to load config file")?;
    let config = AppConfig::resolve(args.overrides(), file).context("Invalid configuration")?;

    info!("Catalog: {}", config.catalog_path.display());
    info!("Ledger: {}", config.ledger_path.display());
    info!(
        batch_size = config.batch_size,
        max_batch_size = config.max_batch_size,
        api_delay_ms = config.api_delay.as_millis() as u64,
        "Batch settings"
    );
    for (name, endpoint) in [("Radarr", &config.radarr), ("Sonarr", &config.sonarr)] {
        match endpoint {
            Some(endpoint) => info!("{}: {}", name, endpoint.base_url),
            None => warn!("{} not configured; its items will fail", name),
        }
    }
    if !config.catalog_path.exists() {
        warn!(
            "Catalog {} not found; listing will fail until it appears",
            config.catalog_path.display()
        );
    }

    let pool = open_ledger_pool(&config.ledger_path)
        .await
        .context("Failed to open status ledger")?;
    let ledger = StatusLedger::new(pool);

    let remote = ArrClient::from_config(&config).context("Failed to build manager clients")?;

    let event_bus = EventBus::new(100);
    let orchestrator = BatchOrchestrator::start(
        Arc::new(SqliteCatalogReader::new(&config.catalog_path)),
        ledger,
        Arc::new(remote),
        event_bus.clone(),
        OrchestratorSettings::from(&config),
    )
    .await
    .context("Failed to reconcile status ledger")?;
    info!(
        "Ledger reconciled ({} interrupted items)",
        orchestrator.reconciled_at_startup()
    );

    let state = AppState::new(orchestrator.clone(), event_bus).with_config(&config);
    let app = ndm_coordinator::build_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(orchestrator.clone()))
        .await
        .context("Server error")?;

    // The in-flight item must reach a terminal state before exit
    info!("Waiting for the active batch to settle");
    orchestrator.wait_idle().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C (or SIGTERM), then cancel any running batch
async fn shutdown_signal(orchestrator: BatchOrchestrator) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }

    if let Some(batch_id) = orchestrator.cancel_active().await {
        info!(batch_id = %batch_id, "Cancelled active batch");
    }
}

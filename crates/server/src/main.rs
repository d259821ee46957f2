use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slicer_core::{
    load_config, validate_config, FfmpegSegmenter, JobLedger, JobOrchestrator, JobService,
    SqliteLedger, WorkspaceManager, YtDlpFetcher,
};

use slicer_server::api::create_router;
use slicer_server::state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("SLICER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    info!(
        "Storage roots: uploads={:?} segments={:?} downloads={:?}",
        config.storage.uploads_dir, config.storage.segments_dir, config.storage.downloads_dir
    );

    // Create SQLite job ledger
    let ledger: Arc<dyn JobLedger> = Arc::new(
        SqliteLedger::new(&config.database.path).context("Failed to create job ledger")?,
    );
    info!("Job ledger initialized");

    // Create workspace manager over the three working roots
    let workspaces = Arc::new(WorkspaceManager::new(config.storage.clone()));

    // Create the external workers
    let fetcher = Arc::new(YtDlpFetcher::new(config.fetcher.clone()));
    let segmenter = Arc::new(FfmpegSegmenter::new(config.segmenter.clone()));

    if let Err(e) = segmenter.validate().await {
        warn!("Media toolkit validation failed: {} (segmentation will fail until resolved)", e);
    }

    // Create the orchestrator
    let orchestrator = Arc::new(JobOrchestrator::new(
        config.orchestrator.clone(),
        Arc::clone(&ledger),
        Arc::clone(&workspaces),
        fetcher,
        segmenter,
    ));

    if config.orchestrator.enabled {
        orchestrator.start().await;
        info!("Job orchestrator started");
    } else {
        info!("Orchestrator disabled in config; submitted jobs stay pending");
    }

    // Create app state
    let jobs: Arc<dyn JobService> = Arc::clone(&orchestrator) as Arc<dyn JobService>;
    let state = Arc::new(AppState::new(config.clone(), Arc::clone(&ledger), jobs));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop orchestrator if running
    info!("Server shutting down...");
    if config.orchestrator.enabled {
        orchestrator.stop().await;
        info!("Orchestrator stopped");
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

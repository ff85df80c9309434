//! Boveda Server
//!
//! A self-hosted backup ingestion and chunked-transfer server: watches a
//! backup landing tree, ships finished archives (split into parts when
//! oversized) to a remote task ledger, and reassembles split backups into
//! time-limited downloads on demand.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use boveda_server::config::Config;
use boveda_server::ledger::HttpLedgerClient;
use boveda_server::reassembly::ReassemblyService;
use boveda_server::routes;
use boveda_server::routes::merge::MergeState;
use boveda_server::state::AppState;
use boveda_server::transfer::TransferOrchestrator;
use boveda_server::watch::BackupWatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boveda_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!("Starting Boveda Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Backup root: {}", config.watcher.backup_dir.display());
    tracing::info!("Temp root: {}", config.server.temp_dir.display());
    tracing::info!("Ledger API: {}", config.ledger.api_url);

    tokio::fs::create_dir_all(&config.server.temp_dir)
        .await
        .context("Failed to create temp directory")?;
    tokio::fs::create_dir_all(&config.watcher.backup_dir)
        .await
        .context("Failed to create backup directory")?;

    // One shared HTTP client with the ledger timeouts, passed explicitly
    // into every component that talks to the ledger
    let http = reqwest::Client::builder()
        .connect_timeout(config.ledger.http_timeout)
        .timeout(config.ledger.http_timeout)
        .build()
        .context("Failed to build HTTP client")?;
    let ledger = Arc::new(HttpLedgerClient::new(http, config.ledger.clone()));

    let app_state = AppState::new(config.clone(), ledger);

    // Watch the backup tree and feed candidates to the orchestrator
    let (watcher, candidates) = BackupWatcher::start(&config.watcher)
        .context("Failed to start backup watcher")?;
    let orchestrator = Arc::new(TransferOrchestrator::new(&app_state));
    let orchestrator_task = tokio::spawn(orchestrator.run(candidates));

    // Reassembly endpoint
    let reassembly = ReassemblyService::new(&app_state);
    let merge_state = MergeState {
        service: reassembly,
        api_key: config.server.merge_api_key.clone(),
    };

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = Router::new()
        .nest("/health", routes::health::router())
        .nest("/api/v1/health", routes::health::router())
        .nest("/api/v1/merge", routes::merge::router(merge_state))
        .nest_service("/files", routes::files::service(&config.server.temp_dir))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server with graceful shutdown
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Boveda Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind listener")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop event delivery, drain the orchestrator, then remove whatever
    // working directories are still registered
    drop(watcher);
    orchestrator_task.abort();
    app_state.shutdown().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}

//! conceptlens-analysis - Misconception Analysis microservice
//!
//! Grades ingested responses, clusters recurring wrong answers in the
//! background, and serves triage and report endpoints over HTTP + SSE.
//! Default port: 5740.

use anyhow::{Context, Result};
use clap::Parser;
use conceptlens_common::config::{load_config_or_default, resolve_config_path};
use conceptlens_common::events::EventBus;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use conceptlens_analysis::config::{Cli, ServiceConfig};
use conceptlens_analysis::services::AnalysisQueue;
use conceptlens_analysis::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration is resolved before tracing so the log level can come from it
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());
    let toml_config = load_config_or_default(config_path.as_deref())?;
    let config = ServiceConfig::resolve(&cli, &toml_config).context("Invalid configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", config.log_level))),
        )
        .init();

    info!(
        "Starting ConceptLens Analysis (conceptlens-analysis) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match &config_path {
        Some(path) => info!("Configuration file: {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }
    info!(
        mode = ?config.analytics_mode,
        threshold = config.clustering.similarity_threshold,
        min_cluster_size = config.clustering.min_cluster_size,
        metric = ?config.clustering.metric,
        seed_order = ?config.clustering.seed_order,
        "Clustering configuration"
    );
    if config.clustering.scoring.ceiling.is_none() {
        info!("Confidence scores are uncapped and can exceed 1.0");
    }

    info!("Database: {}", config.database_path.display());
    let db_pool = conceptlens_common::db::init_database(&config.database_path)
        .await
        .context("Failed to open database")?;

    let event_bus = EventBus::new(config.analysis.event_capacity);
    let shutdown = CancellationToken::new();
    let queue = AnalysisQueue::start(
        db_pool.clone(),
        event_bus.clone(),
        config.clustering,
        config.analysis,
        shutdown.clone(),
    );

    let state = AppState::new(db_pool, event_bus, queue.clone());
    let app = conceptlens_analysis::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    info!("Listening on http://{}", config.bind_address);
    info!("Health check: http://{}/health", config.bind_address);

    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown requested");
            signal_token.cancel();
        })
        .await?;

    queue.shutdown().await;
    info!("conceptlens-analysis stopped");

    Ok(())
}

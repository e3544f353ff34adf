//! conceptlens-analysis library interface
//!
//! Exposes the pipeline, the HTTP router and application state for the
//! binary and for integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use conceptlens_common::events::EventBus;
use services::AnalysisQueue;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Background analysis worker pool
    pub queue: AnalysisQueue,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last analysis failure, shared with the queue
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, event_bus: EventBus, queue: AnalysisQueue) -> Self {
        let last_error = queue.last_error();
        Self {
            db,
            event_bus,
            queue,
            startup_time: Utc::now(),
            last_error,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::health_routes())
        .merge(api::assessment_routes())
        .merge(api::ingest_routes())
        .merge(api::misconception_routes())
        .merge(api::report_routes())
        .route("/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

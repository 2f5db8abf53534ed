//! ndm-coordinator library
//!
//! Migrates items of a legacy nzbdav catalog into Radarr/Sonarr re-download
//! requests while tracking per-item progress in a status ledger.

use axum::Router;
use chrono::{DateTime, Utc};
use ndm_common::{AppConfig, EventBus};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod catalog;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;

pub use error::{ApiError, ApiResult, CoordinatorError, CoordinatorResult};
pub use services::{BatchOrchestrator, ProgressPublisher};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: BatchOrchestrator,
    pub progress: ProgressPublisher,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last background failure, reported by /health
    pub last_error: Arc<RwLock<Option<String>>>,
    /// Redacted settings served by /api/config
    pub config: Option<Arc<api::ConfigView>>,
}

impl AppState {
    pub fn new(orchestrator: BatchOrchestrator, event_bus: EventBus) -> Self {
        Self {
            progress: ProgressPublisher::new(orchestrator.clone()),
            orchestrator,
            event_bus,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
            config: None,
        }
    }

    /// Attach the resolved configuration for /api/config
    pub fn with_config(mut self, config: &AppConfig) -> Self {
        self.config = Some(Arc::new(api::ConfigView::from(config)));
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::item_routes())
        .merge(api::batch_routes())
        .merge(api::maintenance_routes())
        .merge(api::config_routes())
        .route("/api/events", get(api::event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

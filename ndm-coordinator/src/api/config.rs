//! Read-only configuration view
//!
//! Serves the resolved settings the process is running with. API keys never
//! leave the process; only whether one is set is reported.

use axum::{extract::State, routing::get, Json, Router};
use ndm_common::{AppConfig, ManagerEndpoint};
use serde::Serialize;

use crate::{ApiError, ApiResult, AppState};

/// One manager endpoint with its key redacted
#[derive(Debug, Clone, Serialize)]
pub struct EndpointView {
    pub base_url: String,
    pub api_key_set: bool,
}

impl From<&ManagerEndpoint> for EndpointView {
    fn from(endpoint: &ManagerEndpoint) -> Self {
        Self {
            base_url: endpoint.base_url.clone(),
            api_key_set: !endpoint.api_key.is_empty(),
        }
    }
}

/// Resolved configuration as shown to the dashboard
#[derive(Debug, Clone, Serialize)]
pub struct ConfigView {
    pub catalog_path: String,
    pub ledger_path: String,
    pub radarr: Option<EndpointView>,
    pub sonarr: Option<EndpointView>,
    pub batch_size: usize,
    pub max_batch_size: usize,
    pub api_delay_secs: f64,
    pub request_timeout_secs: f64,
    pub sonarr_delete_whole_season: bool,
    pub bind_address: String,
}

impl From<&AppConfig> for ConfigView {
    fn from(config: &AppConfig) -> Self {
        Self {
            catalog_path: config.catalog_path.display().to_string(),
            ledger_path: config.ledger_path.display().to_string(),
            radarr: config.radarr.as_ref().map(EndpointView::from),
            sonarr: config.sonarr.as_ref().map(EndpointView::from),
            batch_size: config.batch_size,
            max_batch_size: config.max_batch_size,
            api_delay_secs: config.api_delay.as_secs_f64(),
            request_timeout_secs: config.request_timeout.as_secs_f64(),
            sonarr_delete_whole_season: config.sonarr_delete_whole_season,
            bind_address: config.bind_address(),
        }
    }
}

/// GET /api/config
pub async fn get_config(State(state): State<AppState>) -> ApiResult<Json<ConfigView>> {
    state
        .config
        .as_deref()
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("configuration not attached".to_string()))
}

pub fn config_routes() -> Router<AppState> {
    Router::new().route("/api/config", get(get_config))
}

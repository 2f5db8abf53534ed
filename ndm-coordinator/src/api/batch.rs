//! Batch control: start, cancel, status

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{BatchOutcome, CatalogFilter, ProgressSnapshot, SelectionRequest};
use crate::AppState;

/// POST /api/process request
///
/// `ids` is the dashboard's explicit selection; without it `filter` picks
/// candidates from the whole catalog.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProcessRequest {
    pub ids: Option<Vec<String>>,
    pub filter: CatalogFilter,
    pub limit: Option<usize>,
}

impl ProcessRequest {
    fn into_selection(self) -> SelectionRequest {
        match self.ids {
            Some(ids) => SelectionRequest {
                limit: self.limit.or(Some(ids.len())),
                filter: CatalogFilter {
                    ids: Some(ids),
                    ..self.filter
                },
            },
            None => SelectionRequest {
                filter: self.filter,
                limit: self.limit,
            },
        }
    }
}

/// POST /api/process response
#[derive(Debug, Serialize)]
pub struct StartBatchResponse {
    pub batch_id: Uuid,
    pub size: usize,
    pub started_at: DateTime<Utc>,
}

/// POST /api/cancel response
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
    pub batch_id: Option<Uuid>,
}

/// GET /api/status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub snapshot: ProgressSnapshot,
    pub last_outcome: Option<BatchOutcome>,
}

/// POST /api/process
///
/// Resolves candidates and runs the batch in the background. Returns 202
/// with the batch id; 409 while another batch is running.
pub async fn start_processing(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> ApiResult<(StatusCode, Json<StartBatchResponse>)> {
    if state.orchestrator.active_batch().await.is_some() {
        return Err(ApiError::Conflict("A batch is already in progress".to_string()));
    }

    let selection = request.into_selection();
    let items = state.orchestrator.select_candidates(&selection).await?;
    if items.is_empty() {
        return Err(ApiError::BadRequest("No eligible items to process".to_string()));
    }

    let handle = state.orchestrator.start_batch(items).await?;
    let response = StartBatchResponse {
        batch_id: handle.batch_id,
        size: handle.size,
        started_at: Utc::now(),
    };

    tracing::info!(batch_id = %handle.batch_id, size = handle.size, "Batch accepted");

    let last_error = state.last_error.clone();
    tokio::spawn(async move {
        if let Err(e) = handle.join().await {
            *last_error.write().await = Some(e.to_string());
        }
    });

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// POST /api/cancel
pub async fn cancel_processing(State(state): State<AppState>) -> Json<CancelResponse> {
    let batch_id = state.orchestrator.cancel_active().await;
    if let Some(batch_id) = batch_id {
        tracing::info!(batch_id = %batch_id, "Batch cancellation requested");
    }

    Json(CancelResponse {
        cancelled: batch_id.is_some(),
        batch_id,
    })
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    let snapshot = state.progress.snapshot().await?;
    let last_outcome = state.orchestrator.last_outcome().await;

    Ok(Json(StatusResponse {
        snapshot,
        last_outcome,
    }))
}

/// Build batch routes
pub fn batch_routes() -> Router<AppState> {
    Router::new()
        .route("/api/process", post(start_processing))
        .route("/api/cancel", post(cancel_processing))
        .route("/api/status", get(get_status))
}

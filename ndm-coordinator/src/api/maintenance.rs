//! Re-queue, found-status checks and connection tests

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::services::{ConnectionCheck, FoundCheck, RequeueOutcome};
use crate::AppState;

/// Request body naming catalog item ids
#[derive(Debug, Deserialize)]
pub struct IdsRequest {
    pub ids: Vec<String>,
}

impl IdsRequest {
    fn validated(self) -> ApiResult<Vec<String>> {
        if self.ids.is_empty() {
            return Err(ApiError::BadRequest("ids must not be empty".to_string()));
        }
        Ok(self.ids)
    }
}

/// POST /api/requeue
pub async fn requeue(
    State(state): State<AppState>,
    Json(request): Json<IdsRequest>,
) -> ApiResult<Json<RequeueOutcome>> {
    let ids = request.validated()?;
    Ok(Json(state.orchestrator.requeue(&ids).await?))
}

/// POST /api/check_found
pub async fn check_found(
    State(state): State<AppState>,
    Json(request): Json<IdsRequest>,
) -> ApiResult<Json<Vec<FoundCheck>>> {
    let ids = request.validated()?;
    Ok(Json(state.orchestrator.verify_found(&ids).await?))
}

/// POST /api/test_connections
pub async fn test_connections(State(state): State<AppState>) -> Json<Vec<ConnectionCheck>> {
    Json(state.orchestrator.test_connections().await)
}

/// Build maintenance routes
pub fn maintenance_routes() -> Router<AppState> {
    Router::new()
        .route("/api/requeue", post(requeue))
        .route("/api/check_found", post(check_found))
        .route("/api/test_connections", post(test_connections))
}

//! Catalog browsing and candidate selection

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ApiResult;
use crate::models::{CatalogFilter, CatalogItem, MediaType, MigrationRecord, SelectionRequest};
use crate::AppState;

/// GET /api/items query
#[derive(Debug, Default, Deserialize)]
pub struct ItemsQuery {
    pub media_type: Option<MediaType>,
    pub category: Option<String>,
    pub search: Option<String>,
}

/// Catalog item with its ledger record
#[derive(Debug, Serialize)]
pub struct ItemView {
    #[serde(flatten)]
    pub item: CatalogItem,
    pub record: Option<MigrationRecord>,
}

/// POST /api/candidates response
#[derive(Debug, Serialize)]
pub struct CandidatesResponse {
    pub count: usize,
    pub items: Vec<CatalogItem>,
}

/// GET /api/items
pub async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<ItemsQuery>,
) -> ApiResult<Json<Vec<ItemView>>> {
    let filter = CatalogFilter {
        media_type: query.media_type,
        category: query.category,
        search: query.search,
        ids: None,
    };

    let items = state.orchestrator.catalog().list_items(&filter).await?;
    let mut records: HashMap<String, MigrationRecord> = state
        .orchestrator
        .ledger()
        .list_all()
        .await?
        .into_iter()
        .map(|record| (record.item_id.clone(), record))
        .collect();

    let views = items
        .into_iter()
        .map(|item| ItemView {
            record: records.remove(&item.id),
            item,
        })
        .collect();

    Ok(Json(views))
}

/// POST /api/candidates
pub async fn select_candidates(
    State(state): State<AppState>,
    Json(request): Json<SelectionRequest>,
) -> ApiResult<Json<CandidatesResponse>> {
    let items = state.orchestrator.select_candidates(&request).await?;
    Ok(Json(CandidatesResponse {
        count: items.len(),
        items,
    }))
}

/// Build catalog routes
pub fn item_routes() -> Router<AppState> {
    Router::new()
        .route("/api/items", get(list_items))
        .route("/api/candidates", post(select_candidates))
}

//! Taxonomy curation API handlers
//!
//! GET /taxonomy, POST /taxonomy/codes, POST /taxonomy/codes/:code/deactivate

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use fincode_common::events::CodifyEvent;
use serde::{Deserialize, Serialize};

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::types::{ItemCode, NewCodeSpec};
use crate::AppState;

/// GET /taxonomy query parameters
#[derive(Debug, Default, Deserialize)]
pub struct TaxonomyQuery {
    /// When true, only active codes are returned
    #[serde(default)]
    pub active_only: bool,
}

/// GET /taxonomy response
#[derive(Debug, Serialize)]
pub struct TaxonomyResponse {
    pub codes: Vec<ItemCode>,
}

/// GET /taxonomy
pub async fn list_taxonomy(
    State(state): State<AppState>,
    Query(query): Query<TaxonomyQuery>,
) -> ApiResult<Json<TaxonomyResponse>> {
    let codes = if query.active_only {
        db::item_codes::list_active_codes(&state.db).await?
    } else {
        db::item_codes::list_codes(&state.db).await?
    };
    Ok(Json(TaxonomyResponse { codes }))
}

/// POST /taxonomy/codes
///
/// Create a canonical code directly, outside the confirmation flow.
/// An existing code with the same identifier is a conflict.
pub async fn create_code(
    State(state): State<AppState>,
    Json(spec): Json<NewCodeSpec>,
) -> ApiResult<Json<ItemCode>> {
    if spec.code.trim().is_empty() {
        return Err(ApiError::BadRequest("Code is required".to_string()));
    }
    if db::item_codes::load_code_by_code(&state.db, &spec.code)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict(format!(
            "Item code already exists: {}",
            spec.code
        )));
    }

    let code = ItemCode::from_spec(&spec);
    db::item_codes::create_item_code(&state.db, &code).await?;

    tracing::info!(code = %code.code, category = %code.category, "Item code created");

    state
        .event_bus
        .emit(CodifyEvent::ItemCodeCreated {
            code_id: code.id,
            code: code.code.clone(),
            category: code.category.clone(),
            timestamp: chrono::Utc::now(),
        })
        .ok();

    Ok(Json(code))
}

/// POST /taxonomy/codes/:code/deactivate response
#[derive(Debug, Serialize)]
pub struct DeactivateResponse {
    pub status: String,
    pub code: String,
}

/// POST /taxonomy/codes/:code/deactivate
///
/// Retire a code without deleting it. Aliases pointing at it survive and
/// match at a reduced confidence so historical vocabulary stays visible.
pub async fn deactivate_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<DeactivateResponse>> {
    db::item_codes::deactivate_code(&state.db, &code).await?;

    tracing::info!(code = %code, "Item code deactivated");

    Ok(Json(DeactivateResponse {
        status: "deactivated".to_string(),
        code,
    }))
}

/// Build taxonomy routes
pub fn taxonomy_routes() -> Router<AppState> {
    Router::new()
        .route("/taxonomy", get(list_taxonomy))
        .route("/taxonomy/codes", post(create_code))
        .route("/taxonomy/codes/:code/deactivate", post(deactivate_code))
}

//! Codification API handlers
//!
//! POST /codify/fast-pass, POST /codify/smart-pass, POST /codify/suggest,
//! plus the per-extraction confirmation and item-management endpoints.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::services::resolver_client::{CodeSuggestion, ResolverCost};
use crate::services::smart_pass::{NewCodeSuggestion, SmartPassTarget};
use crate::services::{confirmation, fast_pass, smart_pass};
use crate::types::{
    CodifiedExtraction, DataType, ExtractedItem, ItemValue, MappingStats, NewCodeSpec,
};
use crate::AppState;

/// POST /codify/fast-pass request
#[derive(Debug, Deserialize)]
pub struct FastPassRequest {
    pub document_id: Uuid,
    pub project_id: Option<Uuid>,
    pub items: Vec<ExtractedItem>,
}

/// POST /codify/fast-pass response
#[derive(Debug, Serialize)]
pub struct FastPassResponse {
    pub extraction: CodifiedExtraction,
    pub stats: fast_pass::FastPassStats,
    pub created: bool,
}

/// POST /codify/fast-pass
///
/// Deterministic resolution against the alias index. Creates the
/// extraction aggregate on first run for a document; re-runs re-resolve
/// unconfirmed items of the existing aggregate in place.
pub async fn run_fast_pass(
    State(state): State<AppState>,
    Json(request): Json<FastPassRequest>,
) -> ApiResult<Json<FastPassResponse>> {
    tracing::info!(
        document_id = %request.document_id,
        items = request.items.len(),
        "Fast Pass requested"
    );

    let outcome = fast_pass::run_fast_pass(
        &state.db,
        &state.event_bus,
        &state.locks,
        state.fuzzy_threshold,
        request.document_id,
        request.project_id,
        request.items,
    )
    .await?;

    Ok(Json(FastPassResponse {
        extraction: outcome.extraction,
        stats: outcome.stats,
        created: outcome.created,
    }))
}

/// POST /codify/smart-pass request
///
/// Exactly one of `extraction_id` / `document_id` selects the target.
#[derive(Debug, Deserialize)]
pub struct SmartPassRequest {
    pub extraction_id: Option<Uuid>,
    pub document_id: Option<Uuid>,
    #[serde(default)]
    pub force: bool,
}

/// POST /codify/smart-pass response
#[derive(Debug, Serialize)]
pub struct SmartPassResponse {
    pub extraction: CodifiedExtraction,
    pub suggestions_applied: usize,
    pub new_code_suggestions: Vec<NewCodeSuggestion>,
    pub cost: ResolverCost,
    pub no_op: bool,
}

/// POST /codify/smart-pass
///
/// Model-assisted resolution of items Fast Pass left pending. Proposes,
/// never confirms. A second run without `force` is a no-op.
pub async fn run_smart_pass(
    State(state): State<AppState>,
    Json(request): Json<SmartPassRequest>,
) -> ApiResult<Json<SmartPassResponse>> {
    let target = match (request.extraction_id, request.document_id) {
        (Some(id), None) => SmartPassTarget::Extraction(id),
        (None, Some(id)) => SmartPassTarget::Document(id),
        _ => {
            return Err(ApiError::BadRequest(
                "Provide exactly one of extraction_id or document_id".to_string(),
            ))
        }
    };

    let outcome = smart_pass::run_smart_pass(
        &state.db,
        &state.event_bus,
        &state.locks,
        state.resolver.as_ref(),
        target,
        request.force,
    )
    .await?;

    Ok(Json(SmartPassResponse {
        extraction: outcome.extraction,
        suggestions_applied: outcome.suggestions_applied,
        new_code_suggestions: outcome.new_code_suggestions,
        cost: outcome.cost,
        no_op: outcome.no_op,
    }))
}

/// POST /codify/suggest request
#[derive(Debug, Deserialize)]
pub struct SuggestRequest {
    pub name: String,
    pub value: Option<serde_json::Value>,
    pub data_type: Option<DataType>,
    pub category: Option<String>,
}

/// POST /codify/suggest
///
/// Single-candidate suggestion for interactive use. Never fails outright
/// on resolver trouble: degrades to the deterministic fallback.
pub async fn suggest_code(
    State(state): State<AppState>,
    Json(request): Json<SuggestRequest>,
) -> ApiResult<Json<CodeSuggestion>> {
    let data_type = request.data_type.unwrap_or(DataType::Currency);
    let value = request
        .value
        .as_ref()
        .map(|raw| ItemValue::coerce(raw, data_type))
        .transpose()
        .map_err(ApiError::from)?;

    let suggestion = smart_pass::suggest_single(
        &state.db,
        state.resolver.as_ref(),
        &request.name,
        value,
        request.category.as_deref(),
    )
    .await?;

    Ok(Json(suggestion))
}

/// GET /extractions/:id
pub async fn get_extraction(
    State(state): State<AppState>,
    Path(extraction_id): Path<Uuid>,
) -> ApiResult<Json<CodifiedExtraction>> {
    let extraction =
        crate::db::extractions::require_extraction(&state.db, extraction_id).await?;
    Ok(Json(extraction))
}

/// POST /extractions/:id/items/:item_id/confirm request
#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub canonical_code_id: Option<Uuid>,
    pub new_code: Option<NewCodeSpec>,
}

/// Confirmation response
#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub status: String,
    pub stats: MappingStats,
    pub is_fully_confirmed: bool,
}

/// POST /extractions/:id/items/:item_id/confirm
///
/// Finalize one item's code and learn an alias from the decision.
pub async fn confirm_item(
    State(state): State<AppState>,
    Path((extraction_id, item_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<ConfirmRequest>,
) -> ApiResult<Json<ConfirmResponse>> {
    let outcome = confirmation::confirm_one(
        &state.db,
        &state.event_bus,
        &state.locks,
        extraction_id,
        item_id,
        request.canonical_code_id,
        request.new_code,
    )
    .await?;

    Ok(Json(ConfirmResponse {
        status: "confirmed".to_string(),
        stats: outcome.stats,
        is_fully_confirmed: outcome.is_fully_confirmed,
    }))
}

/// POST /extractions/:id/confirm-all response
#[derive(Debug, Serialize)]
pub struct ConfirmAllResponse {
    pub status: String,
    pub confirmed: usize,
    pub aliases_created: usize,
    pub stats: MappingStats,
}

/// POST /extractions/:id/confirm-all
///
/// Batch-confirm every suggested item; pending items are untouched.
pub async fn confirm_all(
    State(state): State<AppState>,
    Path(extraction_id): Path<Uuid>,
) -> ApiResult<Json<ConfirmAllResponse>> {
    let outcome =
        confirmation::confirm_all(&state.db, &state.event_bus, &state.locks, extraction_id)
            .await?;

    Ok(Json(ConfirmAllResponse {
        status: "confirmed".to_string(),
        confirmed: outcome.confirmed,
        aliases_created: outcome.aliases_created,
        stats: outcome.stats,
    }))
}

/// POST /extractions/:id/items request
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    #[serde(flatten)]
    pub item: ExtractedItem,
    /// Existing canonical code; when present the item is created confirmed
    pub code: Option<String>,
    /// Owning document; validated against the extraction when present
    pub document_id: Option<Uuid>,
}

/// POST /extractions/:id/items response
#[derive(Debug, Serialize)]
pub struct AddItemResponse {
    pub item_id: Uuid,
    pub stats: MappingStats,
}

/// POST /extractions/:id/items
///
/// Add an item the extraction pipeline missed.
pub async fn add_item(
    State(state): State<AppState>,
    Path(extraction_id): Path<Uuid>,
    Json(request): Json<AddItemRequest>,
) -> ApiResult<Json<AddItemResponse>> {
    let outcome = confirmation::add_item(
        &state.db,
        &state.event_bus,
        &state.locks,
        extraction_id,
        request.document_id,
        request.item,
        request.code,
    )
    .await?;

    Ok(Json(AddItemResponse {
        item_id: outcome.item_id,
        stats: outcome.stats,
    }))
}

/// Build codification routes
pub fn codify_routes() -> Router<AppState> {
    Router::new()
        .route("/codify/fast-pass", post(run_fast_pass))
        .route("/codify/smart-pass", post(run_smart_pass))
        .route("/codify/suggest", post(suggest_code))
        .route("/extractions/:extraction_id", get(get_extraction))
        .route(
            "/extractions/:extraction_id/items/:item_id/confirm",
            post(confirm_item),
        )
        .route("/extractions/:extraction_id/confirm-all", post(confirm_all))
        .route("/extractions/:extraction_id/items", post(add_item))
}

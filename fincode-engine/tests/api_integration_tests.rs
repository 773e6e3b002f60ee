//! HTTP API integration tests
//!
//! Exercises the full router against an in-memory database: taxonomy
//! curation, the Fast Pass / Smart Pass / confirmation loop, and error
//! status mapping.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use fincode_common::events::EventBus;
use fincode_engine::services::resolver_client::{
    CodeResolver, ItemResolution, ResolutionKind, ResolverContext, ResolverCost, ResolverError,
    ResolverResponse, UnconfiguredResolver,
};
use fincode_engine::{build_router, AppState};

/// Resolver that matches every submitted item to one fixed code
struct MatchAllResolver {
    code: String,
    confidence: f64,
}

#[async_trait]
impl CodeResolver for MatchAllResolver {
    async fn resolve(&self, context: &ResolverContext) -> Result<ResolverResponse, ResolverError> {
        let resolutions = context
            .items
            .iter()
            .map(|item| ItemResolution {
                item_id: item.item_id,
                kind: ResolutionKind::Existing {
                    code: self.code.clone(),
                    confidence: self.confidence,
                    reasoning: None,
                },
            })
            .collect();
        Ok(ResolverResponse {
            resolutions,
            cost: ResolverCost::default(),
        })
    }
}

/// Resolver that always fails with a retryable-looking error
struct FailingResolver;

#[async_trait]
impl CodeResolver for FailingResolver {
    async fn resolve(&self, _: &ResolverContext) -> Result<ResolverResponse, ResolverError> {
        Err(ResolverError::Timeout)
    }
}

/// Create a test app with an in-memory database and the given resolver
async fn test_app(resolver: Arc<dyn CodeResolver>) -> Router {
    let db_pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    fincode_engine::db::init_tables(&db_pool).await.unwrap();

    let event_bus = EventBus::new(100);
    let state = AppState::new(db_pool, event_bus, resolver, 0.85, true);
    build_router(state)
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    read_json(response).await
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    read_json(response).await
}

async fn read_json(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn code_spec(code: &str, name: &str) -> Value {
    json!({
        "code": code,
        "display_name": name,
        "category": "costs",
        "data_type": "currency"
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app(Arc::new(UnconfiguredResolver)).await;

    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "fincode-engine");
    assert!(body["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn test_taxonomy_create_list_deactivate() {
    let app = test_app(Arc::new(UnconfiguredResolver)).await;

    let (status, created) = post_json(
        &app,
        "/taxonomy/codes",
        code_spec("costs.siteAcquisition", "Site Acquisition"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["code"], "costs.siteAcquisition");
    assert_eq!(created["active"], true);

    // Duplicate code is a conflict
    let (status, body) = post_json(
        &app,
        "/taxonomy/codes",
        code_spec("costs.siteAcquisition", "Site Acquisition"),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (status, body) = post_json(
        &app,
        "/taxonomy/codes/costs.siteAcquisition/deactivate",
        Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "deactivated");

    // Deactivated codes drop out of the active view but not the full list
    let (_, active) = get_json(&app, "/taxonomy?active_only=true").await;
    assert_eq!(active["codes"].as_array().unwrap().len(), 0);
    let (_, all) = get_json(&app, "/taxonomy").await;
    assert_eq!(all["codes"].as_array().unwrap().len(), 1);

    // Unknown codes 404
    let (status, _) = post_json(&app, "/taxonomy/codes/no.such/deactivate", Value::Null).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_full_codification_loop() {
    let app = test_app(Arc::new(MatchAllResolver {
        code: "costs.siteAcquisition".to_string(),
        confidence: 0.82,
    }))
    .await;

    post_json(
        &app,
        "/taxonomy/codes",
        code_spec("costs.siteAcquisition", "Site Acquisition"),
    )
    .await;

    // Fast Pass with an empty alias set leaves the item pending
    let document_id = Uuid::new_v4();
    let (status, fast) = post_json(
        &app,
        "/codify/fast-pass",
        json!({
            "document_id": document_id,
            "items": [{"name": "Site Acquisition Cost", "value": 250000}]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fast["created"], true);
    assert_eq!(fast["stats"]["pending_review"], 1);
    let extraction_id = fast["extraction"]["id"].as_str().unwrap().to_string();

    // Smart Pass suggests but does not confirm
    let (status, smart) = post_json(
        &app,
        "/codify/smart-pass",
        json!({"extraction_id": extraction_id}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(smart["suggestions_applied"], 1);
    assert_eq!(
        smart["extraction"]["items"][0]["mapping_status"],
        "suggested"
    );
    assert!(smart["extraction"]["items"][0]["item_code"].is_null());

    // Batch confirmation finalizes and learns an alias
    let (status, confirmed) = post_json(
        &app,
        &format!("/extractions/{}/confirm-all", extraction_id),
        Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["confirmed"], 1);
    assert_eq!(confirmed["aliases_created"], 1);

    let (status, extraction) = get_json(&app, &format!("/extractions/{}", extraction_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(extraction["items"][0]["mapping_status"], "confirmed");
    assert_eq!(extraction["items"][0]["item_code"], "costs.siteAcquisition");

    // A second document now resolves in Fast Pass alone, at full confidence
    let (status, fast2) = post_json(
        &app,
        "/codify/fast-pass",
        json!({
            "document_id": Uuid::new_v4(),
            "items": [{"name": "Site Acquisition Cost", "value": 300000}]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fast2["stats"]["exact_hits"], 1);
    let item = &fast2["extraction"]["items"][0];
    assert_eq!(item["mapping_status"], "suggested");
    assert_eq!(item["suggested_code"], "costs.siteAcquisition");
    assert_eq!(item["confidence"], 1.0);
}

#[tokio::test]
async fn test_smart_pass_target_validation() {
    let app = test_app(Arc::new(UnconfiguredResolver)).await;

    // Both ids is invalid
    let (status, body) = post_json(
        &app,
        "/codify/smart-pass",
        json!({
            "extraction_id": Uuid::new_v4(),
            "document_id": Uuid::new_v4()
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    // Neither is invalid too
    let (status, _) = post_json(&app, "/codify/smart-pass", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unknown target is 404
    let (status, _) = post_json(
        &app,
        "/codify/smart-pass",
        json!({"extraction_id": Uuid::new_v4()}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_smart_pass_resolver_failure_is_503() {
    let app = test_app(Arc::new(FailingResolver)).await;

    let document_id = Uuid::new_v4();
    let (_, fast) = post_json(
        &app,
        "/codify/fast-pass",
        json!({
            "document_id": document_id,
            "items": [{"name": "Mystery Fee", "value": 100}]
        }),
    )
    .await;
    let extraction_id = fast["extraction"]["id"].as_str().unwrap().to_string();

    let (status, body) = post_json(
        &app,
        "/codify/smart-pass",
        json!({"extraction_id": extraction_id}),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "RESOLVER_UNAVAILABLE");

    // The failed pass left the extraction untouched
    let (_, extraction) = get_json(&app, &format!("/extractions/{}", extraction_id)).await;
    assert_eq!(extraction["items"][0]["mapping_status"], "pending_review");
    assert_eq!(extraction["smart_pass_completed"], false);
}

#[tokio::test]
async fn test_suggest_degrades_to_fallback() {
    let app = test_app(Arc::new(FailingResolver)).await;

    let (status, suggestion) = post_json(
        &app,
        "/codify/suggest",
        json!({"name": "Loan Arrangement Fee", "category": "finance"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(suggestion["is_new_code"], true);
    assert_eq!(suggestion["code"], "finance.loanArrangementFee");
    assert!((suggestion["confidence"].as_f64().unwrap() - 0.3).abs() < 1e-9);

    // A blank name is rejected before any resolver work
    let (status, _) = post_json(&app, "/codify/suggest", json!({"name": "  "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_confirm_error_statuses() {
    let app = test_app(Arc::new(UnconfiguredResolver)).await;

    // Unknown extraction
    let (status, _) = post_json(
        &app,
        &format!(
            "/extractions/{}/items/{}/confirm",
            Uuid::new_v4(),
            Uuid::new_v4()
        ),
        json!({"canonical_code_id": Uuid::new_v4()}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, fast) = post_json(
        &app,
        "/codify/fast-pass",
        json!({
            "document_id": Uuid::new_v4(),
            "items": [{"name": "Mystery Fee", "value": 10}]
        }),
    )
    .await;
    let extraction_id = fast["extraction"]["id"].as_str().unwrap().to_string();
    let item_id = fast["extraction"]["items"][0]["id"].as_str().unwrap().to_string();

    // Neither code id nor new-code spec
    let (status, body) = post_json(
        &app,
        &format!("/extractions/{}/items/{}/confirm", extraction_id, item_id),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_add_item_endpoint() {
    let app = test_app(Arc::new(UnconfiguredResolver)).await;

    post_json(
        &app,
        "/taxonomy/codes",
        code_spec("fees.legal", "Legal Fees"),
    )
    .await;

    let (_, fast) = post_json(
        &app,
        "/codify/fast-pass",
        json!({
            "document_id": Uuid::new_v4(),
            "items": [{"name": "Mystery Fee", "value": 10}]
        }),
    )
    .await;
    let extraction_id = fast["extraction"]["id"].as_str().unwrap().to_string();

    // With a code: created confirmed
    let (status, added) = post_json(
        &app,
        &format!("/extractions/{}/items", extraction_id),
        json!({"name": "Legal & Professional Fees", "value": 50000, "code": "fees.legal"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(added["stats"]["confirmed"], 1);
    assert_eq!(added["stats"]["total"], 2);

    // Without a code: created pending
    let (status, added) = post_json(
        &app,
        &format!("/extractions/{}/items", extraction_id),
        json!({"name": "Unplanned Expense"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(added["stats"]["pending_review"], 2);
}

//! fincode-engine library interface
//!
//! Exposes public APIs for integration testing

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod services;
pub mod types;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use fincode_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::services::locks::ExtractionLocks;
use crate::services::resolver_client::CodeResolver;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for codification lifecycle events
    pub event_bus: EventBus,
    /// Per-extraction write locks
    pub locks: ExtractionLocks,
    /// Model-assisted resolver client
    pub resolver: Arc<dyn CodeResolver>,
    /// Minimum fuzzy similarity for alias matches
    pub fuzzy_threshold: f64,
    /// Whether a real resolver endpoint is configured
    pub resolver_configured: bool,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        resolver: Arc<dyn CodeResolver>,
        fuzzy_threshold: f64,
        resolver_configured: bool,
    ) -> Self {
        Self {
            db,
            event_bus,
            locks: ExtractionLocks::new(),
            resolver,
            fuzzy_threshold,
            resolver_configured,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::codify_routes())
        .merge(api::taxonomy_routes())
        .merge(api::health_routes())
        .with_state(state)
}

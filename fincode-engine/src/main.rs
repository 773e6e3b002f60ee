//! fincode-engine - Item Codification Engine
//!
//! Resolves extracted financial line items to canonical item codes via a
//! tiered pipeline: a deterministic Fast Pass over learned aliases, a
//! model-assisted Smart Pass for the remainder, and a confirmation loop
//! that turns human decisions into new aliases.

use anyhow::Result;
use std::path::Path;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use fincode_common::events::EventBus;
use fincode_engine::config::EngineConfig;
use fincode_engine::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting fincode-engine (Item Codification Engine)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Resolve configuration (ENV over TOML over defaults)
    let config = EngineConfig::load()?;
    info!("Database: {}", config.database_path);
    info!(
        "Fuzzy threshold: {:.2}, resolver configured: {}",
        config.fuzzy_threshold,
        config.resolver_base_url.is_some()
    );

    // Initialize database connection pool and schema
    let db_pool = fincode_engine::db::init_database_pool(Path::new(&config.database_path)).await?;
    info!("Database connection established");

    // Event bus for codification lifecycle events
    let event_bus = EventBus::new(100);

    // Resolver client (or the unconfigured stand-in)
    let resolver_configured = config.resolver_base_url.is_some();
    let resolver = config.build_resolver()?;

    let state = AppState::new(
        db_pool,
        event_bus,
        resolver,
        config.fuzzy_threshold,
        resolver_configured,
    );

    let app = fincode_engine::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("Listening on http://{}", config.bind_address);
    info!("Health check: http://{}/health", config.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}

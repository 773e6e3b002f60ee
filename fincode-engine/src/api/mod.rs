//! HTTP API handlers for fincode-engine

pub mod codify;
pub mod health;
pub mod taxonomy;

pub use codify::codify_routes;
pub use health::health_routes;
pub use taxonomy::taxonomy_routes;

//! # Fincode Common Library
//!
//! Shared code for the fincode services including:
//! - Error types (Error enum, Result alias)
//! - Event types (CodifyEvent enum) and EventBus
//! - Configuration loading

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};

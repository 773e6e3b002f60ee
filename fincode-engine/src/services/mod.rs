//! Codification services
//!
//! The tiered resolution pipeline: deterministic Fast Pass over the
//! alias index, model-assisted Smart Pass behind the resolver client,
//! and the Confirmation Learner that feeds human decisions back into
//! the index.

pub mod alias_index;
pub mod confirmation;
pub mod fast_pass;
pub mod locks;
pub mod resolver_client;
pub mod smart_pass;

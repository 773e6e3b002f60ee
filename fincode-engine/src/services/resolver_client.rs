//! Model-assisted resolver client
//!
//! Smart Pass and the single-item suggestion path talk to an external
//! resolver service through the [`CodeResolver`] trait so tests can
//! substitute a scripted resolver. The HTTP implementation carries a
//! bounded timeout and a small number of retries with exponential
//! backoff; when it is exhausted the caller degrades to the deterministic
//! fallback rather than hanging.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::types::{DataType, ItemValue};

/// Confidence assigned to deterministic fallback suggestions. Low on
/// purpose: the fallback knows nothing beyond the normalized name.
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Resolver client errors
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Unparsable resolver output: {0}")]
    Parse(String),

    #[error("Resolver not configured")]
    NotConfigured,
}

impl ResolverError {
    /// Whether a retry could plausibly succeed
    fn is_retryable(&self) -> bool {
        match self {
            ResolverError::Network(_) | ResolverError::Timeout => true,
            ResolverError::Api(status, _) => *status >= 500 || *status == 429,
            ResolverError::Parse(_) | ResolverError::NotConfigured => false,
        }
    }
}

// ============================================================================
// Context and Response Types
// ============================================================================

/// Taxonomy entry included in the resolver context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyEntry {
    pub code: String,
    pub display_name: String,
    pub data_type: DataType,
}

/// Known alias included in the resolver context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasEntry {
    pub alias: String,
    pub code: String,
}

/// Pending item submitted for resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingItem {
    pub item_id: Uuid,
    pub name: String,
    pub value: Option<ItemValue>,
    pub category: Option<String>,
}

/// Context assembled for one resolver call
///
/// The taxonomy (grouped by category) and the alias set bound the
/// resolver's answer space to known codes while still allowing it to
/// propose new ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverContext {
    /// Active taxonomy grouped by category
    pub taxonomy: BTreeMap<String, Vec<TaxonomyEntry>>,
    /// Full alias set
    pub aliases: Vec<AliasEntry>,
    /// Items to resolve
    pub items: Vec<PendingItem>,
}

/// Per-item answer from the resolver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResolution {
    pub item_id: Uuid,
    #[serde(flatten)]
    pub kind: ResolutionKind,
}

/// Either a match against an existing code or a proposal for a new one
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionKind {
    /// The resolver matched an existing canonical code
    Existing {
        code: String,
        confidence: f64,
        reasoning: Option<String>,
    },
    /// The resolver proposes a brand-new code; never auto-applied
    NewCode {
        code: String,
        display_name: String,
        category: String,
        data_type: DataType,
        confidence: f64,
        reasoning: Option<String>,
    },
}

/// Cost metric reported back to the caller for observability
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResolverCost {
    pub items_submitted: usize,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub latency_ms: u64,
}

/// Full resolver response for a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverResponse {
    pub resolutions: Vec<ItemResolution>,
    #[serde(default)]
    pub cost: ResolverCost,
}

/// One suggestion for a single candidate name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSuggestion {
    pub code: String,
    pub display_name: String,
    pub category: String,
    pub data_type: DataType,
    pub confidence: f64,
    pub is_new_code: bool,
    pub reasoning: Option<String>,
}

// ============================================================================
// Resolver Trait
// ============================================================================

/// Seam between the engine and the external model-assisted resolver
#[async_trait]
pub trait CodeResolver: Send + Sync {
    /// Resolve a batch of pending items against the provided context
    async fn resolve(&self, context: &ResolverContext) -> Result<ResolverResponse, ResolverError>;
}

// ============================================================================
// HTTP Implementation
// ============================================================================

/// HTTP client for the external resolver service
pub struct HttpResolverClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
    backoff: Duration,
}

impl HttpResolverClient {
    /// Create a new resolver client
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the resolver service
    /// * `api_key` - Optional bearer token
    /// * `timeout` - Per-request timeout
    /// * `max_retries` - Retry attempts after the first failure
    /// * `backoff` - Initial backoff between retries (doubles per attempt)
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
        max_retries: u32,
        backoff: Duration,
    ) -> Result<Self, ResolverError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ResolverError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
            api_key,
            max_retries,
            backoff,
        })
    }

    async fn resolve_once(
        &self,
        context: &ResolverContext,
    ) -> Result<ResolverResponse, ResolverError> {
        let url = format!("{}/v1/resolve", self.base_url.trim_end_matches('/'));

        tracing::debug!(
            url = %url,
            items = context.items.len(),
            aliases = context.aliases.len(),
            "Submitting resolution batch"
        );

        let mut request = self.http_client.post(&url).json(context);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ResolverError::Timeout
            } else {
                ResolverError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ResolverError::Api(status.as_u16(), error_text));
        }

        response
            .json::<ResolverResponse>()
            .await
            .map_err(|e| ResolverError::Parse(e.to_string()))
    }
}

#[async_trait]
impl CodeResolver for HttpResolverClient {
    async fn resolve(&self, context: &ResolverContext) -> Result<ResolverResponse, ResolverError> {
        let mut backoff = self.backoff;
        let mut attempt = 0u32;

        loop {
            match self.resolve_once(context).await {
                Ok(response) => {
                    tracing::info!(
                        items = context.items.len(),
                        resolutions = response.resolutions.len(),
                        latency_ms = response.cost.latency_ms,
                        "Resolver batch complete"
                    );
                    return Ok(response);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "Resolver call failed, retrying after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Stand-in used when no resolver endpoint is configured
///
/// Smart Pass fails fast with a clear error; the single-item suggestion
/// path degrades to the deterministic fallback.
pub struct UnconfiguredResolver;

#[async_trait]
impl CodeResolver for UnconfiguredResolver {
    async fn resolve(&self, _context: &ResolverContext) -> Result<ResolverResponse, ResolverError> {
        Err(ResolverError::NotConfigured)
    }
}

// ============================================================================
// Deterministic Fallback
// ============================================================================

/// Deterministic suggestion derived purely from the normalized name
///
/// Used when the resolver is unavailable so the workflow is never fully
/// blocked. Always proposes a new code at a fixed low confidence.
pub fn fallback_suggestion(
    name: &str,
    category_hint: Option<&str>,
    data_type: DataType,
) -> CodeSuggestion {
    let normalized = crate::services::alias_index::normalize_name(name);
    let category = category_hint
        .map(str::to_string)
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| "uncategorized".to_string());

    CodeSuggestion {
        code: format!("{}.{}", category, camel_case(&normalized)),
        display_name: title_case(&normalized),
        category,
        data_type,
        confidence: FALLBACK_CONFIDENCE,
        is_new_code: true,
        reasoning: None,
    }
}

fn camel_case(normalized: &str) -> String {
    let mut out = String::with_capacity(normalized.len());
    for (i, word) in normalized.split_whitespace().enumerate() {
        if i == 0 {
            out.push_str(word);
        } else {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    if out.is_empty() {
        out.push_str("item");
    }
    out
}

fn title_case(normalized: &str) -> String {
    normalized
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_is_deterministic() {
        let a = fallback_suggestion("Site Acquisition Cost", Some("costs"), DataType::Currency);
        let b = fallback_suggestion("site acquisition cost!", Some("costs"), DataType::Currency);
        assert_eq!(a.code, b.code);
        assert_eq!(a.code, "costs.siteAcquisitionCost");
        assert_eq!(a.display_name, "Site Acquisition Cost");
        assert_eq!(a.confidence, FALLBACK_CONFIDENCE);
        assert!(a.is_new_code);
    }

    #[test]
    fn test_fallback_without_category_hint() {
        let suggestion = fallback_suggestion("Misc Item", None, DataType::Number);
        assert_eq!(suggestion.code, "uncategorized.miscItem");
        assert_eq!(suggestion.category, "uncategorized");
    }

    #[test]
    fn test_fallback_empty_name_still_total() {
        let suggestion = fallback_suggestion("  !!  ", None, DataType::Text);
        assert_eq!(suggestion.code, "uncategorized.item");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ResolverError::Timeout.is_retryable());
        assert!(ResolverError::Network("reset".into()).is_retryable());
        assert!(ResolverError::Api(503, String::new()).is_retryable());
        assert!(ResolverError::Api(429, String::new()).is_retryable());
        assert!(!ResolverError::Api(400, String::new()).is_retryable());
        assert!(!ResolverError::Parse("bad json".into()).is_retryable());
    }

    #[test]
    fn test_resolution_kind_wire_format() {
        let json = serde_json::json!({
            "item_id": Uuid::new_v4(),
            "kind": "existing",
            "code": "costs.siteAcquisition",
            "confidence": 0.82,
            "reasoning": "matches site acquisition vocabulary"
        });
        let resolution: ItemResolution = serde_json::from_value(json).unwrap();
        match resolution.kind {
            ResolutionKind::Existing { code, confidence, .. } => {
                assert_eq!(code, "costs.siteAcquisition");
                assert!((confidence - 0.82).abs() < 1e-9);
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }
}

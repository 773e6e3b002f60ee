//! Core domain types for the Item Codification Engine
//!
//! Defines the canonical taxonomy entry (ItemCode), the learned alias
//! (ItemCodeAlias), and the per-document extraction aggregate
//! (CodifiedExtraction) with its embedded items.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fincode_common::{Error, Result};

// ============================================================================
// Taxonomy Types
// ============================================================================

/// Data type of a codified line item value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Monetary amount
    Currency,
    /// Plain number (counts, areas, ratios)
    Number,
    /// Percentage (stored as the percent figure, not a fraction)
    Percentage,
    /// Free text
    Text,
}

impl DataType {
    /// String form used in database columns and resolver payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Currency => "currency",
            DataType::Number => "number",
            DataType::Percentage => "percentage",
            DataType::Text => "text",
        }
    }

    /// Parse from the database string form
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "currency" => Ok(DataType::Currency),
            "number" => Ok(DataType::Number),
            "percentage" => Ok(DataType::Percentage),
            "text" | "string" => Ok(DataType::Text),
            other => Err(Error::InvalidInput(format!("Unknown data type: {}", other))),
        }
    }
}

/// Typed value of an extracted line item
///
/// Extraction payloads arrive as loosely-typed JSON; they are coerced into
/// this tagged union at the API boundary so the engine never carries
/// untyped blobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ItemValue {
    Currency(f64),
    Number(f64),
    Percentage(f64),
    Text(String),
}

impl ItemValue {
    /// The data type this value carries
    pub fn data_type(&self) -> DataType {
        match self {
            ItemValue::Currency(_) => DataType::Currency,
            ItemValue::Number(_) => DataType::Number,
            ItemValue::Percentage(_) => DataType::Percentage,
            ItemValue::Text(_) => DataType::Text,
        }
    }

    /// Coerce a loosely-typed JSON value into a typed item value
    ///
    /// Numeric strings are parsed when the declared type is numeric;
    /// anything unparsable is an invalid-argument error rather than a
    /// silently carried blob.
    pub fn coerce(raw: &serde_json::Value, data_type: DataType) -> Result<Self> {
        match data_type {
            DataType::Text => match raw {
                serde_json::Value::String(s) => Ok(ItemValue::Text(s.clone())),
                other => Ok(ItemValue::Text(other.to_string())),
            },
            numeric => {
                let number = match raw {
                    serde_json::Value::Number(n) => n.as_f64(),
                    serde_json::Value::String(s) => {
                        s.trim().replace([',', '$', '%'], "").parse::<f64>().ok()
                    }
                    _ => None,
                };
                let number = number.ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "Cannot coerce {} to {}",
                        raw,
                        numeric.as_str()
                    ))
                })?;
                Ok(match numeric {
                    DataType::Currency => ItemValue::Currency(number),
                    DataType::Number => ItemValue::Number(number),
                    DataType::Percentage => ItemValue::Percentage(number),
                    DataType::Text => unreachable!(),
                })
            }
        }
    }
}

/// Canonical taxonomy entry
///
/// Item codes are append-only: a retired code is deactivated, never
/// deleted, so historical aliases remain resolvable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemCode {
    pub id: Uuid,
    /// Unique dotted-path identifier, e.g. "costs.siteAcquisition"
    pub code: String,
    pub display_name: String,
    pub category: String,
    pub data_type: DataType,
    pub active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Specification for creating a new canonical code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCodeSpec {
    pub code: String,
    pub display_name: String,
    pub category: String,
    pub data_type: DataType,
}

// ============================================================================
// Alias Types
// ============================================================================

/// Provenance of an alias entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasSource {
    /// Written by the confirmation learner from a human decision
    UserConfirmed,
    /// Written when a user added an item with an explicit code
    Manual,
    /// Written from an accepted model suggestion
    AiSuggested,
}

impl AliasSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AliasSource::UserConfirmed => "user_confirmed",
            AliasSource::Manual => "manual",
            AliasSource::AiSuggested => "ai_suggested",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "user_confirmed" => Ok(AliasSource::UserConfirmed),
            "manual" => Ok(AliasSource::Manual),
            "ai_suggested" => Ok(AliasSource::AiSuggested),
            other => Err(Error::InvalidInput(format!(
                "Unknown alias source: {}",
                other
            ))),
        }
    }

    /// Priority used to break build-time collisions in the alias index
    /// (user_confirmed > manual > ai_suggested)
    pub fn priority(&self) -> u8 {
        match self {
            AliasSource::UserConfirmed => 2,
            AliasSource::Manual => 1,
            AliasSource::AiSuggested => 0,
        }
    }
}

/// Learned mapping from a raw item name to a canonical code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemCodeAlias {
    pub id: Uuid,
    /// Raw text as it appeared in a document
    pub alias_raw: String,
    /// Normalized form (see `services::alias_index::normalize_name`)
    pub alias_normalized: String,
    pub canonical_code: String,
    pub canonical_code_id: Uuid,
    /// Confidence that this alias denotes the canonical code (0.0-1.0)
    pub confidence: f64,
    pub source: AliasSource,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// ============================================================================
// Extraction Types
// ============================================================================

/// Resolution state of a codified item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingStatus {
    /// No confident match yet; awaiting Smart Pass or manual review
    PendingReview,
    /// A resolver proposed a code; awaiting human confirmation
    Suggested,
    /// A human (or explicit manual code) finalized the mapping
    Confirmed,
}

/// One codified line item inside an extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodifiedItem {
    /// Stable id within the extraction
    pub id: Uuid,
    /// Raw name as extracted from the document
    pub original_name: String,
    pub value: Option<ItemValue>,
    pub data_type: DataType,
    /// Category hint from the extraction pipeline, if any
    pub category: Option<String>,
    /// Final canonical code; set if and only if status is Confirmed
    pub item_code: Option<String>,
    pub suggested_code: Option<String>,
    pub suggested_code_id: Option<Uuid>,
    /// Confidence of the current suggestion (0.0 when pending)
    pub confidence: f64,
    pub mapping_status: MappingStatus,
}

/// Counts of items per mapping status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingStats {
    pub total: usize,
    pub pending_review: usize,
    pub suggested: usize,
    pub confirmed: usize,
}

/// Per-document aggregate of codified items
///
/// Created once per document by Fast Pass; Smart Pass and confirmations
/// mutate it in place. Never recreated for the same document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodifiedExtraction {
    pub id: Uuid,
    pub document_id: Uuid,
    pub project_id: Option<Uuid>,
    pub items: Vec<CodifiedItem>,
    pub smart_pass_completed: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl CodifiedExtraction {
    /// Recompute per-status counts from the current items
    pub fn mapping_stats(&self) -> MappingStats {
        let mut stats = MappingStats {
            total: self.items.len(),
            ..Default::default()
        };
        for item in &self.items {
            match item.mapping_status {
                MappingStatus::PendingReview => stats.pending_review += 1,
                MappingStatus::Suggested => stats.suggested += 1,
                MappingStatus::Confirmed => stats.confirmed += 1,
            }
        }
        stats
    }

    /// True when every item is confirmed (and there is at least one item)
    pub fn is_fully_confirmed(&self) -> bool {
        !self.items.is_empty()
            && self
                .items
                .iter()
                .all(|item| item.mapping_status == MappingStatus::Confirmed)
    }

    /// Find an item by id
    pub fn item(&self, item_id: Uuid) -> Option<&CodifiedItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    /// Find an item by id, mutably
    pub fn item_mut(&mut self, item_id: Uuid) -> Option<&mut CodifiedItem> {
        self.items.iter_mut().find(|item| item.id == item_id)
    }
}

/// Raw line item submitted by the extraction pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedItem {
    /// Free-form name, e.g. "Site Acquisition Cost"
    pub name: String,
    /// Loosely-typed value; coerced via [`ItemValue::coerce`]
    pub value: Option<serde_json::Value>,
    #[serde(default = "default_data_type")]
    pub data_type: DataType,
    pub category: Option<String>,
}

fn default_data_type() -> DataType {
    DataType::Currency
}

//! Smart Pass Resolver
//!
//! Batches the items Fast Pass could not confidently resolve and consults
//! the external model-assisted resolver with taxonomy and alias context.
//! Smart Pass proposes, it does not decide: applied results become
//! `Suggested`, never `Confirmed`, and new-code proposals are surfaced
//! separately for explicit confirmation.

use std::collections::{BTreeMap, HashMap};

use fincode_common::events::{CodifyEvent, EventBus};
use fincode_common::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db;
use crate::services::locks::ExtractionLocks;
use crate::services::resolver_client::{
    fallback_suggestion, AliasEntry, CodeResolver, CodeSuggestion, PendingItem, ResolutionKind,
    ResolverContext, ResolverCost, ResolverResponse, TaxonomyEntry,
};
use crate::types::{CodifiedExtraction, DataType, ItemCode, ItemValue, MappingStatus};

/// How the caller identifies the extraction to operate on
#[derive(Debug, Clone, Copy)]
pub enum SmartPassTarget {
    Extraction(Uuid),
    Document(Uuid),
}

/// Proposal for a brand-new canonical code, surfaced but not applied
#[derive(Debug, Clone, Serialize)]
pub struct NewCodeSuggestion {
    pub item_id: Uuid,
    pub suggestion: CodeSuggestion,
}

/// Result of a Smart Pass run
#[derive(Debug)]
pub struct SmartPassOutcome {
    pub extraction: CodifiedExtraction,
    pub suggestions_applied: usize,
    pub new_code_suggestions: Vec<NewCodeSuggestion>,
    pub cost: ResolverCost,
    /// True when the pass had nothing to do and returned current state
    pub no_op: bool,
}

/// Run Smart Pass for one extraction
///
/// No-op (current state unchanged) when there are zero eligible items, or
/// when the pass already completed and `force` was not requested. With
/// `force`, items already `Suggested` are re-submitted to allow
/// re-attempting low-confidence matches. On resolver failure the whole
/// pass fails without mutating the extraction.
pub async fn run_smart_pass(
    pool: &SqlitePool,
    event_bus: &EventBus,
    locks: &ExtractionLocks,
    resolver: &dyn CodeResolver,
    target: SmartPassTarget,
    force: bool,
) -> Result<SmartPassOutcome> {
    let extraction_id = resolve_target(pool, target).await?;

    let _guard = locks.acquire(extraction_id).await;
    let mut extraction = db::extractions::require_extraction(pool, extraction_id).await?;

    let eligible: Vec<Uuid> = extraction
        .items
        .iter()
        .filter(|item| match item.mapping_status {
            MappingStatus::PendingReview => true,
            MappingStatus::Suggested => force,
            MappingStatus::Confirmed => false,
        })
        .map(|item| item.id)
        .collect();

    if eligible.is_empty() || (extraction.smart_pass_completed && !force) {
        tracing::debug!(
            extraction_id = %extraction_id,
            eligible = eligible.len(),
            completed = extraction.smart_pass_completed,
            "Smart Pass no-op"
        );
        return Ok(SmartPassOutcome {
            extraction,
            suggestions_applied: 0,
            new_code_suggestions: Vec::new(),
            cost: ResolverCost::default(),
            no_op: true,
        });
    }

    let codes = db::item_codes::list_active_codes(pool).await?;
    let context = assemble_context(pool, &codes, &extraction, &eligible).await?;

    let response = resolver.resolve(&context).await.map_err(|e| {
        tracing::warn!(extraction_id = %extraction_id, error = %e, "Smart Pass resolver failed");
        Error::ResolverUnavailable(e.to_string())
    })?;

    let (applied, new_code_suggestions) =
        apply_response(&mut extraction, &eligible, &codes, &response);

    extraction.smart_pass_completed = true;
    db::extractions::update_extraction(pool, &extraction).await?;

    tracing::info!(
        extraction_id = %extraction_id,
        submitted = eligible.len(),
        applied,
        proposals = new_code_suggestions.len(),
        "Smart Pass complete"
    );

    event_bus
        .emit(CodifyEvent::SmartPassCompleted {
            extraction_id,
            suggestions_applied: applied,
            new_code_suggestions: new_code_suggestions.len(),
            timestamp: chrono::Utc::now(),
        })
        .ok();

    let stats = extraction.mapping_stats();
    event_bus
        .emit(CodifyEvent::ExtractionUpdated {
            extraction_id,
            confirmed: stats.confirmed,
            suggested: stats.suggested,
            pending_review: stats.pending_review,
            is_fully_confirmed: extraction.is_fully_confirmed(),
            timestamp: chrono::Utc::now(),
        })
        .ok();

    Ok(SmartPassOutcome {
        extraction,
        suggestions_applied: applied,
        new_code_suggestions,
        cost: response.cost,
        no_op: false,
    })
}

/// Standalone low-latency suggestion for exactly one candidate name
///
/// Assembles the same context as a batch pass; degrades to the
/// deterministic fallback (normalized-name-derived new code, fixed low
/// confidence) when the resolver is unavailable.
pub async fn suggest_single(
    pool: &SqlitePool,
    resolver: &dyn CodeResolver,
    name: &str,
    value: Option<ItemValue>,
    category_hint: Option<&str>,
) -> Result<CodeSuggestion> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput("Item name is required".to_string()));
    }

    let codes = db::item_codes::list_active_codes(pool).await?;
    let aliases = db::aliases::list_aliases(pool).await?;

    let item_id = Uuid::new_v4();
    let context = ResolverContext {
        taxonomy: group_taxonomy(&codes),
        aliases: aliases
            .iter()
            .map(|a| AliasEntry {
                alias: a.alias_raw.clone(),
                code: a.canonical_code.clone(),
            })
            .collect(),
        items: vec![PendingItem {
            item_id,
            name: name.to_string(),
            value,
            category: category_hint.map(str::to_string),
        }],
    };

    match resolver.resolve(&context).await {
        Ok(response) => {
            let resolution = response
                .resolutions
                .into_iter()
                .find(|r| r.item_id == item_id);
            match resolution {
                Some(resolution) => Ok(suggestion_from_resolution(resolution.kind, &codes)),
                None => {
                    tracing::warn!(name = %name, "Resolver returned no resolution for item, using fallback");
                    Ok(fallback_suggestion(name, category_hint, DataType::Currency))
                }
            }
        }
        Err(e) => {
            tracing::warn!(name = %name, error = %e, "Single-item resolver unavailable, using fallback");
            Ok(fallback_suggestion(name, category_hint, DataType::Currency))
        }
    }
}

async fn resolve_target(pool: &SqlitePool, target: SmartPassTarget) -> Result<Uuid> {
    match target {
        SmartPassTarget::Extraction(id) => Ok(db::extractions::require_extraction(pool, id).await?.id),
        SmartPassTarget::Document(document_id) => {
            db::extractions::load_extraction_by_document(pool, document_id)
                .await?
                .map(|e| e.id)
                .ok_or_else(|| {
                    Error::NotFound(format!("No extraction for document: {}", document_id))
                })
        }
    }
}

fn group_taxonomy(codes: &[ItemCode]) -> BTreeMap<String, Vec<TaxonomyEntry>> {
    let mut taxonomy: BTreeMap<String, Vec<TaxonomyEntry>> = BTreeMap::new();
    for code in codes {
        taxonomy
            .entry(code.category.clone())
            .or_default()
            .push(TaxonomyEntry {
                code: code.code.clone(),
                display_name: code.display_name.clone(),
                data_type: code.data_type,
            });
    }
    taxonomy
}

async fn assemble_context(
    pool: &SqlitePool,
    codes: &[ItemCode],
    extraction: &CodifiedExtraction,
    eligible: &[Uuid],
) -> Result<ResolverContext> {
    let aliases = db::aliases::list_aliases(pool).await?;

    let items = extraction
        .items
        .iter()
        .filter(|item| eligible.contains(&item.id))
        .map(|item| PendingItem {
            item_id: item.id,
            name: item.original_name.clone(),
            value: item.value.clone(),
            category: item.category.clone(),
        })
        .collect();

    Ok(ResolverContext {
        taxonomy: group_taxonomy(codes),
        aliases: aliases
            .iter()
            .map(|a| AliasEntry {
                alias: a.alias_raw.clone(),
                code: a.canonical_code.clone(),
            })
            .collect(),
        items,
    })
}

/// Apply resolver output to eligible items only
///
/// Existing-code matches must reference a known active code; anything
/// else leaves the item untouched. New-code proposals are collected for
/// the caller, never applied.
fn apply_response(
    extraction: &mut CodifiedExtraction,
    eligible: &[Uuid],
    codes: &[ItemCode],
    response: &ResolverResponse,
) -> (usize, Vec<NewCodeSuggestion>) {
    let by_code: HashMap<&str, &ItemCode> =
        codes.iter().map(|c| (c.code.as_str(), c)).collect();

    let mut applied = 0;
    let mut proposals = Vec::new();

    for resolution in &response.resolutions {
        if !eligible.contains(&resolution.item_id) {
            tracing::warn!(
                item_id = %resolution.item_id,
                "Resolver answered for an ineligible item, ignoring"
            );
            continue;
        }
        let Some(item) = extraction.item_mut(resolution.item_id) else {
            tracing::warn!(item_id = %resolution.item_id, "Resolver answered for unknown item");
            continue;
        };

        match &resolution.kind {
            ResolutionKind::Existing {
                code,
                confidence,
                reasoning,
            } => {
                let Some(known) = by_code.get(code.as_str()) else {
                    tracing::warn!(
                        item_id = %item.id,
                        code = %code,
                        "Resolver matched unknown code, leaving item pending"
                    );
                    continue;
                };
                tracing::debug!(
                    name = %item.original_name,
                    code = %code,
                    confidence,
                    reasoning = reasoning.as_deref().unwrap_or(""),
                    "Smart Pass suggestion"
                );
                item.suggested_code = Some(known.code.clone());
                item.suggested_code_id = Some(known.id);
                item.confidence = confidence.clamp(0.0, 1.0);
                item.mapping_status = MappingStatus::Suggested;
                applied += 1;
            }
            ResolutionKind::NewCode {
                code,
                display_name,
                category,
                data_type,
                confidence,
                reasoning,
            } => {
                proposals.push(NewCodeSuggestion {
                    item_id: resolution.item_id,
                    suggestion: CodeSuggestion {
                        code: code.clone(),
                        display_name: display_name.clone(),
                        category: category.clone(),
                        data_type: *data_type,
                        confidence: confidence.clamp(0.0, 1.0),
                        is_new_code: true,
                        reasoning: reasoning.clone(),
                    },
                });
            }
        }
    }

    (applied, proposals)
}

fn suggestion_from_resolution(kind: ResolutionKind, codes: &[ItemCode]) -> CodeSuggestion {
    match kind {
        ResolutionKind::Existing {
            code,
            confidence,
            reasoning,
        } => {
            let known = codes.iter().find(|c| c.code == code);
            CodeSuggestion {
                display_name: known
                    .map(|c| c.display_name.clone())
                    .unwrap_or_else(|| code.clone()),
                category: known
                    .map(|c| c.category.clone())
                    .unwrap_or_else(|| "uncategorized".to_string()),
                data_type: known.map(|c| c.data_type).unwrap_or(DataType::Currency),
                code,
                confidence: confidence.clamp(0.0, 1.0),
                is_new_code: false,
                reasoning,
            }
        }
        ResolutionKind::NewCode {
            code,
            display_name,
            category,
            data_type,
            confidence,
            reasoning,
        } => CodeSuggestion {
            code,
            display_name,
            category,
            data_type,
            confidence: confidence.clamp(0.0, 1.0),
            is_new_code: true,
            reasoning,
        },
    }
}

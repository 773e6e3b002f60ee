//! Fast Pass Resolver
//!
//! Deterministic + fuzzy matching of raw item names against the alias
//! index. No network calls; completes in well under typical request
//! timeouts and is safe to run repeatedly against the same extraction.
//! This is the only resolver that creates the extraction aggregate.

use std::collections::HashSet;

use fincode_common::events::{CodifyEvent, EventBus};
use fincode_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db;
use crate::services::alias_index::{AliasIndex, JaroWinklerSimilarity, MatchType};
use crate::services::locks::ExtractionLocks;
use crate::types::{
    CodifiedExtraction, CodifiedItem, ExtractedItem, ItemValue, MappingStatus,
};

/// Summary statistics for one Fast Pass run
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FastPassStats {
    pub exact_hits: usize,
    pub fuzzy_hits: usize,
    pub suggested: usize,
    pub pending_review: usize,
}

/// Result of a Fast Pass run
#[derive(Debug)]
pub struct FastPassOutcome {
    pub extraction: CodifiedExtraction,
    pub stats: FastPassStats,
    /// True when this run created the aggregate (first run for the document)
    pub created: bool,
}

/// Build the alias index from current persisted state
///
/// Rebuilt per resolution batch; cost is bounded by the alias-table size.
pub async fn build_index(pool: &SqlitePool, fuzzy_threshold: f64) -> Result<AliasIndex> {
    let aliases = db::aliases::list_aliases(pool).await?;
    let active_ids: HashSet<Uuid> = db::item_codes::list_active_codes(pool)
        .await?
        .into_iter()
        .map(|code| code.id)
        .collect();

    Ok(AliasIndex::build(
        &aliases,
        &active_ids,
        fuzzy_threshold,
        Box::new(JaroWinklerSimilarity),
    ))
}

/// Run Fast Pass for one document
///
/// Creates the extraction aggregate on first run; on re-runs the existing
/// aggregate is updated in place (confirmed items are never touched,
/// non-confirmed items are re-resolved against the current index).
pub async fn run_fast_pass(
    pool: &SqlitePool,
    event_bus: &EventBus,
    locks: &ExtractionLocks,
    fuzzy_threshold: f64,
    document_id: Uuid,
    project_id: Option<Uuid>,
    items: Vec<ExtractedItem>,
) -> Result<FastPassOutcome> {
    let index = build_index(pool, fuzzy_threshold).await?;

    if let Some(existing) = db::extractions::load_extraction_by_document(pool, document_id).await? {
        return rerun(pool, event_bus, locks, &index, document_id, existing.id).await;
    }

    // Serialize competing first runs on the document id, then re-check:
    // the loser of the race must fall into the update path instead of
    // tripping the document_id unique constraint.
    let _doc_guard = locks.acquire(document_id).await;
    if let Some(existing) = db::extractions::load_extraction_by_document(pool, document_id).await? {
        return rerun(pool, event_bus, locks, &index, document_id, existing.id).await;
    }

    let mut extraction = new_extraction(document_id, project_id, items)?;
    let stats = resolve_items(&index, &mut extraction.items);
    db::extractions::insert_extraction(pool, &extraction).await?;

    tracing::info!(
        document_id = %document_id,
        extraction_id = %extraction.id,
        total = extraction.items.len(),
        exact = stats.exact_hits,
        fuzzy = stats.fuzzy_hits,
        pending = stats.pending_review,
        "Fast Pass created extraction"
    );

    event_bus
        .emit(CodifyEvent::ExtractionCreated {
            extraction_id: extraction.id,
            document_id,
            item_count: extraction.items.len(),
            timestamp: chrono::Utc::now(),
        })
        .ok();
    emit_updated(event_bus, &extraction);

    Ok(FastPassOutcome {
        extraction,
        stats,
        created: true,
    })
}

/// Re-resolve an existing aggregate in place
async fn rerun(
    pool: &SqlitePool,
    event_bus: &EventBus,
    locks: &ExtractionLocks,
    index: &AliasIndex,
    document_id: Uuid,
    extraction_id: Uuid,
) -> Result<FastPassOutcome> {
    // Serialize with Smart Pass / confirmations on this aggregate,
    // then reload under the lock.
    let _guard = locks.acquire(extraction_id).await;
    let mut extraction = db::extractions::require_extraction(pool, extraction_id).await?;

    let stats = resolve_items(index, &mut extraction.items);
    db::extractions::update_extraction(pool, &extraction).await?;

    tracing::info!(
        document_id = %document_id,
        extraction_id = %extraction.id,
        exact = stats.exact_hits,
        fuzzy = stats.fuzzy_hits,
        pending = stats.pending_review,
        "Fast Pass re-resolved existing extraction"
    );

    emit_updated(event_bus, &extraction);

    Ok(FastPassOutcome {
        extraction,
        stats,
        created: false,
    })
}

fn new_extraction(
    document_id: Uuid,
    project_id: Option<Uuid>,
    items: Vec<ExtractedItem>,
) -> Result<CodifiedExtraction> {
    let now = chrono::Utc::now();
    let items = items
        .into_iter()
        .map(|item| {
            let value = item
                .value
                .as_ref()
                .map(|raw| ItemValue::coerce(raw, item.data_type))
                .transpose()?;
            Ok(CodifiedItem {
                id: Uuid::new_v4(),
                original_name: item.name,
                value,
                data_type: item.data_type,
                category: item.category,
                item_code: None,
                suggested_code: None,
                suggested_code_id: None,
                confidence: 0.0,
                mapping_status: MappingStatus::PendingReview,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CodifiedExtraction {
        id: Uuid::new_v4(),
        document_id,
        project_id,
        items,
        smart_pass_completed: false,
        created_at: now,
        updated_at: now,
    })
}

/// Resolve every non-confirmed item against the index, in place
fn resolve_items(index: &AliasIndex, items: &mut [CodifiedItem]) -> FastPassStats {
    let mut stats = FastPassStats::default();

    for item in items.iter_mut() {
        if item.mapping_status == MappingStatus::Confirmed {
            continue;
        }

        match index.lookup(&item.original_name) {
            Some(hit) => {
                tracing::debug!(
                    name = %item.original_name,
                    code = %hit.canonical_code,
                    match_type = hit.match_type.as_str(),
                    confidence = hit.confidence,
                    "Fast Pass hit"
                );
                match hit.match_type {
                    MatchType::Exact => stats.exact_hits += 1,
                    MatchType::Fuzzy => stats.fuzzy_hits += 1,
                }
                stats.suggested += 1;
                item.suggested_code = Some(hit.canonical_code);
                item.suggested_code_id = Some(hit.canonical_code_id);
                item.confidence = hit.confidence;
                item.mapping_status = MappingStatus::Suggested;
            }
            None => {
                stats.pending_review += 1;
                item.suggested_code = None;
                item.suggested_code_id = None;
                item.confidence = 0.0;
                item.mapping_status = MappingStatus::PendingReview;
            }
        }
    }

    stats
}

fn emit_updated(event_bus: &EventBus, extraction: &CodifiedExtraction) {
    let stats = extraction.mapping_stats();
    event_bus
        .emit(CodifyEvent::ExtractionUpdated {
            extraction_id: extraction.id,
            confirmed: stats.confirmed,
            suggested: stats.suggested,
            pending_review: stats.pending_review,
            is_fully_confirmed: extraction.is_fully_confirmed(),
            timestamp: chrono::Utc::now(),
        })
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::types::{AliasSource, DataType, ItemCode, ItemCodeAlias, NewCodeSpec};
    use serde_json::json;

    const THRESHOLD: f64 = 0.85;

    fn extracted(name: &str) -> ExtractedItem {
        ExtractedItem {
            name: name.to_string(),
            value: Some(json!("100000")),
            data_type: DataType::Currency,
            category: Some("costs".to_string()),
        }
    }

    async fn seed_alias(pool: &SqlitePool, raw: &str, code: &str) -> Uuid {
        let item_code = ItemCode::from_spec(&NewCodeSpec {
            code: code.to_string(),
            display_name: raw.to_string(),
            category: "costs".to_string(),
            data_type: DataType::Currency,
        });
        db::item_codes::create_item_code(pool, &item_code).await.unwrap();
        let alias = ItemCodeAlias::new(raw, code, item_code.id, 1.0, AliasSource::UserConfirmed);
        db::aliases::insert_alias(pool, &alias).await.unwrap();
        item_code.id
    }

    #[tokio::test]
    async fn test_fast_pass_creates_extraction() {
        let pool = test_pool().await;
        let bus = EventBus::new(16);
        let locks = ExtractionLocks::new();

        seed_alias(&pool, "Site Acquisition Cost", "costs.siteAcquisition").await;

        let outcome = run_fast_pass(
            &pool,
            &bus,
            &locks,
            THRESHOLD,
            Uuid::new_v4(),
            None,
            vec![extracted("Site Acquisition Cost"), extracted("Mystery Fee")],
        )
        .await
        .expect("fast pass");

        assert!(outcome.created);
        assert_eq!(outcome.stats.exact_hits, 1);
        assert_eq!(outcome.stats.pending_review, 1);

        let resolved = &outcome.extraction.items[0];
        assert_eq!(resolved.mapping_status, MappingStatus::Suggested);
        assert_eq!(resolved.suggested_code.as_deref(), Some("costs.siteAcquisition"));
        assert_eq!(resolved.confidence, 1.0);

        let pending = &outcome.extraction.items[1];
        assert_eq!(pending.mapping_status, MappingStatus::PendingReview);
        assert_eq!(pending.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_fast_pass_never_suggests_below_threshold() {
        let pool = test_pool().await;
        let bus = EventBus::new(16);
        let locks = ExtractionLocks::new();

        seed_alias(&pool, "Site Acquisition Cost", "costs.siteAcquisition").await;

        let outcome = run_fast_pass(
            &pool,
            &bus,
            &locks,
            THRESHOLD,
            Uuid::new_v4(),
            None,
            vec![extracted("Annual Debt Service Payment")],
        )
        .await
        .unwrap();

        assert_eq!(outcome.stats.suggested, 0);
        assert_eq!(
            outcome.extraction.items[0].mapping_status,
            MappingStatus::PendingReview
        );
    }

    #[tokio::test]
    async fn test_fast_pass_rerun_is_idempotent_and_updates_in_place() {
        let pool = test_pool().await;
        let bus = EventBus::new(16);
        let locks = ExtractionLocks::new();
        let document_id = Uuid::new_v4();

        let first = run_fast_pass(
            &pool,
            &bus,
            &locks,
            THRESHOLD,
            document_id,
            None,
            vec![extracted("Net Construction Costs")],
        )
        .await
        .unwrap();
        assert!(first.created);
        assert_eq!(first.stats.pending_review, 1);

        // Learn the vocabulary, then re-run the pass for the same document
        seed_alias(&pool, "Net Construction Costs", "costs.construction").await;

        let second = run_fast_pass(
            &pool,
            &bus,
            &locks,
            THRESHOLD,
            document_id,
            None,
            vec![extracted("Net Construction Costs")],
        )
        .await
        .unwrap();

        assert!(!second.created);
        assert_eq!(second.extraction.id, first.extraction.id);
        assert_eq!(second.stats.exact_hits, 1);
        assert_eq!(
            second.extraction.items[0].mapping_status,
            MappingStatus::Suggested
        );
    }

    #[tokio::test]
    async fn test_concurrent_first_runs_create_one_extraction() {
        let pool = test_pool().await;
        let bus = EventBus::new(16);
        let locks = ExtractionLocks::new();
        let document_id = Uuid::new_v4();

        let (a, b) = tokio::join!(
            run_fast_pass(
                &pool,
                &bus,
                &locks,
                THRESHOLD,
                document_id,
                None,
                vec![extracted("Mystery Fee")],
            ),
            run_fast_pass(
                &pool,
                &bus,
                &locks,
                THRESHOLD,
                document_id,
                None,
                vec![extracted("Mystery Fee")],
            ),
        );

        let a = a.expect("first racer");
        let b = b.expect("second racer");

        // Exactly one run created the aggregate; the other updated it
        assert_eq!(a.extraction.id, b.extraction.id);
        assert!(a.created != b.created);
        let stored = db::extractions::load_extraction_by_document(&pool, document_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.items.len(), 1);
    }

    #[tokio::test]
    async fn test_fast_pass_leaves_confirmed_items_alone() {
        let pool = test_pool().await;
        let bus = EventBus::new(16);
        let locks = ExtractionLocks::new();
        let document_id = Uuid::new_v4();

        let outcome = run_fast_pass(
            &pool,
            &bus,
            &locks,
            THRESHOLD,
            document_id,
            None,
            vec![extracted("Broker Fee")],
        )
        .await
        .unwrap();

        // Confirm the item out-of-band
        let mut extraction = outcome.extraction;
        extraction.items[0].mapping_status = MappingStatus::Confirmed;
        extraction.items[0].item_code = Some("fees.broker".to_string());
        db::extractions::update_extraction(&pool, &extraction).await.unwrap();

        // An alias now exists that would re-suggest a different code
        seed_alias(&pool, "Broker Fee", "fees.brokerage").await;

        let rerun = run_fast_pass(
            &pool,
            &bus,
            &locks,
            THRESHOLD,
            document_id,
            None,
            vec![extracted("Broker Fee")],
        )
        .await
        .unwrap();

        let item = &rerun.extraction.items[0];
        assert_eq!(item.mapping_status, MappingStatus::Confirmed);
        assert_eq!(item.item_code.as_deref(), Some("fees.broker"));
    }

    #[tokio::test]
    async fn test_fast_pass_rejects_uncoercible_value() {
        let pool = test_pool().await;
        let bus = EventBus::new(16);
        let locks = ExtractionLocks::new();

        let result = run_fast_pass(
            &pool,
            &bus,
            &locks,
            THRESHOLD,
            Uuid::new_v4(),
            None,
            vec![ExtractedItem {
                name: "Bad Value".to_string(),
                value: Some(json!("not-a-number")),
                data_type: DataType::Currency,
                category: None,
            }],
        )
        .await;

        assert!(matches!(
            result,
            Err(fincode_common::Error::InvalidInput(_))
        ));
    }
}

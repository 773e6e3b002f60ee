//! Confirmation Learner
//!
//! Converts a human decision into both an immediate state change on the
//! extraction and a durable learning signal: every confirmation persists
//! a new alias so future Fast Pass runs resolve the same raw text without
//! a model call. Alias creation is unconditional; the index's
//! last-write-wins rule resolves any resulting ambiguity.

use fincode_common::events::{CodifyEvent, EventBus};
use fincode_common::{Error, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db;
use crate::services::locks::ExtractionLocks;
use crate::types::{
    AliasSource, CodifiedExtraction, CodifiedItem, ExtractedItem, ItemCode, ItemCodeAlias,
    ItemValue, MappingStats, MappingStatus, NewCodeSpec,
};

/// Result of confirming one item
#[derive(Debug)]
pub struct ConfirmOutcome {
    pub stats: MappingStats,
    pub is_fully_confirmed: bool,
}

/// Result of a batch confirmation
#[derive(Debug)]
pub struct ConfirmAllOutcome {
    pub stats: MappingStats,
    pub confirmed: usize,
    pub aliases_created: usize,
}

/// Result of a manual item addition
#[derive(Debug)]
pub struct AddItemOutcome {
    pub item_id: Uuid,
    pub stats: MappingStats,
}

/// Confirm a single item
///
/// Exactly one of `canonical_code_id` or `new_code` must identify the
/// final code. When `new_code` is supplied the ItemCode is created first;
/// an exact code collision fails with a clear invalid-argument error
/// rather than silently overwriting. One alias is created per
/// confirmation call, even when an alias for the normalized text already
/// exists (documented duplicate-alias allowance).
pub async fn confirm_one(
    pool: &SqlitePool,
    event_bus: &EventBus,
    locks: &ExtractionLocks,
    extraction_id: Uuid,
    item_id: Uuid,
    canonical_code_id: Option<Uuid>,
    new_code: Option<NewCodeSpec>,
) -> Result<ConfirmOutcome> {
    let _guard = locks.acquire(extraction_id).await;
    let mut extraction = db::extractions::require_extraction(pool, extraction_id).await?;

    if extraction.item(item_id).is_none() {
        return Err(Error::NotFound(format!(
            "Item {} not found in extraction {}",
            item_id, extraction_id
        )));
    }

    let code = match (new_code, canonical_code_id) {
        (Some(spec), _) => {
            let code = ItemCode::from_spec(&spec);
            db::item_codes::create_item_code(pool, &code).await?;
            event_bus
                .emit(CodifyEvent::ItemCodeCreated {
                    code_id: code.id,
                    code: code.code.clone(),
                    category: code.category.clone(),
                    timestamp: chrono::Utc::now(),
                })
                .ok();
            code
        }
        (None, Some(code_id)) => db::item_codes::load_code_by_id(pool, code_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Item code not found: {}", code_id)))?,
        (None, None) => {
            return Err(Error::InvalidInput(
                "Confirmation requires a canonical code id or a new-code spec".to_string(),
            ))
        }
    };

    let item = extraction.item_mut(item_id).ok_or_else(|| {
        Error::NotFound(format!(
            "Item {} not found in extraction {}",
            item_id, extraction_id
        ))
    })?;
    item.item_code = Some(code.code.clone());
    item.suggested_code = Some(code.code.clone());
    item.suggested_code_id = Some(code.id);
    item.confidence = 1.0;
    item.mapping_status = MappingStatus::Confirmed;
    let original_name = item.original_name.clone();

    learn_alias(
        pool,
        event_bus,
        &original_name,
        &code.code,
        code.id,
        AliasSource::UserConfirmed,
    )
    .await?;

    db::extractions::update_extraction(pool, &extraction).await?;

    tracing::info!(
        extraction_id = %extraction_id,
        item = %original_name,
        code = %code.code,
        "Item confirmed"
    );

    emit_updated(event_bus, &extraction);

    Ok(ConfirmOutcome {
        stats: extraction.mapping_stats(),
        is_fully_confirmed: extraction.is_fully_confirmed(),
    })
}

/// Confirm every suggested item with a non-empty suggested code, in one batch
///
/// Items still pending review, or already confirmed, are untouched. One
/// alias is created per confirmed item.
pub async fn confirm_all(
    pool: &SqlitePool,
    event_bus: &EventBus,
    locks: &ExtractionLocks,
    extraction_id: Uuid,
) -> Result<ConfirmAllOutcome> {
    let _guard = locks.acquire(extraction_id).await;
    let mut extraction = db::extractions::require_extraction(pool, extraction_id).await?;

    let mut confirmed = 0;
    let mut aliases_created = 0;

    let to_confirm: Vec<(Uuid, String, String, Uuid)> = extraction
        .items
        .iter()
        .filter(|item| item.mapping_status == MappingStatus::Suggested)
        .filter_map(|item| {
            let code = item.suggested_code.clone().filter(|c| !c.is_empty())?;
            let code_id = item.suggested_code_id?;
            Some((item.id, item.original_name.clone(), code, code_id))
        })
        .collect();

    for (item_id, original_name, code, code_id) in to_confirm {
        let Some(item) = extraction.item_mut(item_id) else {
            continue;
        };
        item.item_code = Some(code.clone());
        item.mapping_status = MappingStatus::Confirmed;
        item.confidence = 1.0;
        confirmed += 1;

        learn_alias(
            pool,
            event_bus,
            &original_name,
            &code,
            code_id,
            AliasSource::UserConfirmed,
        )
        .await?;
        aliases_created += 1;
    }

    db::extractions::update_extraction(pool, &extraction).await?;

    tracing::info!(
        extraction_id = %extraction_id,
        confirmed,
        aliases_created,
        "Batch confirmation complete"
    );

    emit_updated(event_bus, &extraction);

    Ok(ConfirmAllOutcome {
        stats: extraction.mapping_stats(),
        confirmed,
        aliases_created,
    })
}

/// Add an item the extraction pipeline missed
///
/// With an explicit code the item is created directly as confirmed and a
/// `manual` alias is learned immediately; without one it is created
/// pending review and participates in the normal Fast/Smart Pass cycle
/// on the next run. A supplied `document_id` must match the extraction's
/// owning document.
pub async fn add_item(
    pool: &SqlitePool,
    event_bus: &EventBus,
    locks: &ExtractionLocks,
    extraction_id: Uuid,
    document_id: Option<Uuid>,
    item: ExtractedItem,
    code: Option<String>,
) -> Result<AddItemOutcome> {
    if item.name.trim().is_empty() {
        return Err(Error::InvalidInput("Item name is required".to_string()));
    }

    let _guard = locks.acquire(extraction_id).await;
    let mut extraction = db::extractions::require_extraction(pool, extraction_id).await?;

    if let Some(document_id) = document_id {
        if document_id != extraction.document_id {
            return Err(Error::InvalidInput(format!(
                "Document {} does not own extraction {}",
                document_id, extraction_id
            )));
        }
    }

    let value = item
        .value
        .as_ref()
        .map(|raw| ItemValue::coerce(raw, item.data_type))
        .transpose()?;

    let mut new_item = CodifiedItem {
        id: Uuid::new_v4(),
        original_name: item.name.clone(),
        value,
        data_type: item.data_type,
        category: item.category,
        item_code: None,
        suggested_code: None,
        suggested_code_id: None,
        confidence: 0.0,
        mapping_status: MappingStatus::PendingReview,
    };

    if let Some(code_str) = code {
        let known = db::item_codes::load_code_by_code(pool, &code_str)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Item code not found: {}", code_str)))?;

        new_item.item_code = Some(known.code.clone());
        new_item.suggested_code = Some(known.code.clone());
        new_item.suggested_code_id = Some(known.id);
        new_item.confidence = 1.0;
        new_item.mapping_status = MappingStatus::Confirmed;

        learn_alias(
            pool,
            event_bus,
            &item.name,
            &known.code,
            known.id,
            AliasSource::Manual,
        )
        .await?;
    }

    let item_id = new_item.id;
    extraction.items.push(new_item);
    db::extractions::update_extraction(pool, &extraction).await?;

    tracing::info!(
        extraction_id = %extraction_id,
        item = %item.name,
        confirmed = extraction.items.last().map(|i| i.mapping_status == MappingStatus::Confirmed).unwrap_or(false),
        "Manual item added"
    );

    emit_updated(event_bus, &extraction);

    Ok(AddItemOutcome {
        item_id,
        stats: extraction.mapping_stats(),
    })
}

/// Persist one alias and announce it
async fn learn_alias(
    pool: &SqlitePool,
    event_bus: &EventBus,
    raw_name: &str,
    code: &str,
    code_id: Uuid,
    source: AliasSource,
) -> Result<()> {
    let alias = ItemCodeAlias::new(raw_name, code, code_id, 1.0, source);
    db::aliases::insert_alias(pool, &alias).await?;

    event_bus
        .emit(CodifyEvent::AliasCreated {
            alias_id: alias.id,
            canonical_code: code.to_string(),
            source: source.as_str().to_string(),
            timestamp: chrono::Utc::now(),
        })
        .ok();

    Ok(())
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

//! Extraction record database operations
//!
//! One row per source document. Items are embedded as a JSON array so a
//! resolver pass or confirmation persists the whole aggregate in a single
//! all-or-nothing update.

use fincode_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::types::{CodifiedExtraction, CodifiedItem};

/// Insert a new extraction aggregate
///
/// Only Fast Pass creates extractions; a second insert for the same
/// document is an internal error (the unique constraint backs this up).
pub async fn insert_extraction(pool: &SqlitePool, extraction: &CodifiedExtraction) -> Result<()> {
    let items_json = serde_json::to_string(&extraction.items)
        .map_err(|e| Error::Internal(format!("Serialize items failed: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO codified_extractions (
            guid, document_id, project_id, items, smart_pass_completed, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(extraction.id.to_string())
    .bind(extraction.document_id.to_string())
    .bind(extraction.project_id.map(|id| id.to_string()))
    .bind(items_json)
    .bind(extraction.smart_pass_completed as i64)
    .bind(extraction.created_at.to_rfc3339())
    .bind(extraction.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Persist the current items and smart-pass flag of an extraction
pub async fn update_extraction(pool: &SqlitePool, extraction: &CodifiedExtraction) -> Result<()> {
    let items_json = serde_json::to_string(&extraction.items)
        .map_err(|e| Error::Internal(format!("Serialize items failed: {}", e)))?;

    let result = sqlx::query(
        r#"
        UPDATE codified_extractions
        SET items = ?, smart_pass_completed = ?, updated_at = ?
        WHERE guid = ?
        "#,
    )
    .bind(items_json)
    .bind(extraction.smart_pass_completed as i64)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(extraction.id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!(
            "Extraction not found: {}",
            extraction.id
        )));
    }

    Ok(())
}

/// Load an extraction by id
pub async fn load_extraction(pool: &SqlitePool, id: Uuid) -> Result<Option<CodifiedExtraction>> {
    let row = sqlx::query(
        r#"
        SELECT guid, document_id, project_id, items, smart_pass_completed, created_at, updated_at
        FROM codified_extractions
        WHERE guid = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(row_to_extraction).transpose()
}

/// Load an extraction by its owning document
pub async fn load_extraction_by_document(
    pool: &SqlitePool,
    document_id: Uuid,
) -> Result<Option<CodifiedExtraction>> {
    let row = sqlx::query(
        r#"
        SELECT guid, document_id, project_id, items, smart_pass_completed, created_at, updated_at
        FROM codified_extractions
        WHERE document_id = ?
        "#,
    )
    .bind(document_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(row_to_extraction).transpose()
}

/// Load an extraction by id, failing with not-found when absent
pub async fn require_extraction(pool: &SqlitePool, id: Uuid) -> Result<CodifiedExtraction> {
    load_extraction(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Extraction not found: {}", id)))
}

fn row_to_extraction(row: sqlx::sqlite::SqliteRow) -> Result<CodifiedExtraction> {
    let guid_str: String = row.get("guid");
    let document_id_str: String = row.get("document_id");
    let project_id_str: Option<String> = row.get("project_id");
    let items_json: String = row.get("items");
    let smart_pass_completed: i64 = row.get("smart_pass_completed");
    let created_at_str: String = row.get("created_at");
    let updated_at_str: String = row.get("updated_at");

    let items: Vec<CodifiedItem> = serde_json::from_str(&items_json)
        .map_err(|e| Error::Internal(format!("Deserialize items failed: {}", e)))?;

    Ok(CodifiedExtraction {
        id: Uuid::parse_str(&guid_str)
            .map_err(|e| Error::Internal(format!("Bad guid in extractions: {}", e)))?,
        document_id: Uuid::parse_str(&document_id_str)
            .map_err(|e| Error::Internal(format!("Bad document id: {}", e)))?,
        project_id: project_id_str.and_then(|s| Uuid::parse_str(&s).ok()),
        items,
        smart_pass_completed: smart_pass_completed != 0,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map_err(|e| Error::Internal(format!("Bad timestamp: {}", e)))?
            .with_timezone(&chrono::Utc),
        updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at_str)
            .map_err(|e| Error::Internal(format!("Bad timestamp: {}", e)))?
            .with_timezone(&chrono::Utc),
    })
}

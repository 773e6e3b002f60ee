//! Alias database operations
//!
//! The persisted ground-truth store behind the alias index. Inserts are
//! unconditional: a second alias for an already-aliased normalized string
//! is allowed, and the index's last-write-wins rule resolves the
//! ambiguity at lookup time.

use fincode_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::services::alias_index::normalize_name;
use crate::types::{AliasSource, ItemCodeAlias};

impl ItemCodeAlias {
    /// Build a new alias for a raw name, deriving the normalized form
    pub fn new(
        alias_raw: &str,
        canonical_code: &str,
        canonical_code_id: Uuid,
        confidence: f64,
        source: AliasSource,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            alias_raw: alias_raw.to_string(),
            alias_normalized: normalize_name(alias_raw),
            canonical_code: canonical_code.to_string(),
            canonical_code_id,
            confidence: confidence.clamp(0.0, 1.0),
            source,
            created_at: chrono::Utc::now(),
        }
    }
}

/// Insert an alias row
pub async fn insert_alias(pool: &SqlitePool, alias: &ItemCodeAlias) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO item_code_aliases (
            guid, alias_raw, alias_normalized, canonical_code, canonical_code_id,
            confidence, source, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(alias.id.to_string())
    .bind(&alias.alias_raw)
    .bind(&alias.alias_normalized)
    .bind(&alias.canonical_code)
    .bind(alias.canonical_code_id.to_string())
    .bind(alias.confidence)
    .bind(alias.source.as_str())
    .bind(alias.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    tracing::info!(
        alias = %alias.alias_raw,
        code = %alias.canonical_code,
        source = alias.source.as_str(),
        "Alias persisted"
    );

    Ok(())
}

/// Load all alias rows, oldest first
pub async fn list_aliases(pool: &SqlitePool) -> Result<Vec<ItemCodeAlias>> {
    let rows = sqlx::query(
        r#"
        SELECT guid, alias_raw, alias_normalized, canonical_code, canonical_code_id,
               confidence, source, created_at
        FROM item_code_aliases
        ORDER BY created_at
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let guid_str: String = row.get("guid");
            let code_id_str: String = row.get("canonical_code_id");
            let source_str: String = row.get("source");
            let created_at_str: String = row.get("created_at");

            Ok(ItemCodeAlias {
                id: Uuid::parse_str(&guid_str).map_err(|e| {
                    fincode_common::Error::Internal(format!("Bad guid in aliases: {}", e))
                })?,
                alias_raw: row.get("alias_raw"),
                alias_normalized: row.get("alias_normalized"),
                canonical_code: row.get("canonical_code"),
                canonical_code_id: Uuid::parse_str(&code_id_str).map_err(|e| {
                    fincode_common::Error::Internal(format!("Bad code id in aliases: {}", e))
                })?,
                confidence: row.get("confidence"),
                source: AliasSource::parse(&source_str)?,
                created_at: chrono::DateTime::parse_from_rfc3339(&created_at_str)
                    .map_err(|e| fincode_common::Error::Internal(format!("Bad timestamp: {}", e)))?
                    .with_timezone(&chrono::Utc),
            })
        })
        .collect()
}

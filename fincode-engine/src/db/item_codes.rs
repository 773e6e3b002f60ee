//! Item code database operations
//!
//! The canonical taxonomy store: append-only with deactivation, not
//! deletion, so historical aliases remain resolvable.

use fincode_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::types::{DataType, ItemCode, NewCodeSpec};

impl ItemCode {
    /// Create a new active item code from a spec
    pub fn from_spec(spec: &NewCodeSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: spec.code.clone(),
            display_name: spec.display_name.clone(),
            category: spec.category.clone(),
            data_type: spec.data_type,
            active: true,
            created_at: chrono::Utc::now(),
        }
    }
}

/// Insert a new item code
///
/// Fails with an invalid-argument error if the code already exists; the
/// caller decides whether that is a conflict (curator create) or a signal
/// to reuse the existing code (confirmation path).
pub async fn create_item_code(pool: &SqlitePool, code: &ItemCode) -> Result<()> {
    if load_code_by_code(pool, &code.code).await?.is_some() {
        return Err(Error::InvalidInput(format!(
            "Item code already exists: {}",
            code.code
        )));
    }

    sqlx::query(
        r#"
        INSERT INTO item_codes (guid, code, display_name, category, data_type, active, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(code.id.to_string())
    .bind(&code.code)
    .bind(&code.display_name)
    .bind(&code.category)
    .bind(code.data_type.as_str())
    .bind(code.active as i64)
    .bind(code.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    tracing::info!(code = %code.code, category = %code.category, "Item code created");

    Ok(())
}

/// Load an item code by its dotted-path code
pub async fn load_code_by_code(pool: &SqlitePool, code: &str) -> Result<Option<ItemCode>> {
    let row = sqlx::query(
        r#"
        SELECT guid, code, display_name, category, data_type, active, created_at
        FROM item_codes
        WHERE code = ?
        "#,
    )
    .bind(code)
    .fetch_optional(pool)
    .await?;

    row.map(row_to_code).transpose()
}

/// Load an item code by id
pub async fn load_code_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<ItemCode>> {
    let row = sqlx::query(
        r#"
        SELECT guid, code, display_name, category, data_type, active, created_at
        FROM item_codes
        WHERE guid = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(row_to_code).transpose()
}

/// List all item codes, active and inactive, ordered by category then code
pub async fn list_codes(pool: &SqlitePool) -> Result<Vec<ItemCode>> {
    let rows = sqlx::query(
        r#"
        SELECT guid, code, display_name, category, data_type, active, created_at
        FROM item_codes
        ORDER BY category, code
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(row_to_code).collect()
}

/// List active item codes, ordered by category then code
pub async fn list_active_codes(pool: &SqlitePool) -> Result<Vec<ItemCode>> {
    let rows = sqlx::query(
        r#"
        SELECT guid, code, display_name, category, data_type, active, created_at
        FROM item_codes
        WHERE active = 1
        ORDER BY category, code
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(row_to_code).collect()
}

/// Deactivate an item code
///
/// Item codes are never hard-deleted. Returns not-found if the code does
/// not exist.
pub async fn deactivate_code(pool: &SqlitePool, code: &str) -> Result<()> {
    let result = sqlx::query("UPDATE item_codes SET active = 0 WHERE code = ?")
        .bind(code)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Item code not found: {}", code)));
    }

    tracing::info!(code = %code, "Item code deactivated");

    Ok(())
}

fn row_to_code(row: sqlx::sqlite::SqliteRow) -> Result<ItemCode> {
    let guid_str: String = row.get("guid");
    let data_type_str: String = row.get("data_type");
    let created_at_str: String = row.get("created_at");
    let active: i64 = row.get("active");

    Ok(ItemCode {
        id: Uuid::parse_str(&guid_str)
            .map_err(|e| fincode_common::Error::Internal(format!("Bad guid in item_codes: {}", e)))?,
        code: row.get("code"),
        display_name: row.get("display_name"),
        category: row.get("category"),
        data_type: DataType::parse(&data_type_str)?,
        active: active != 0,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map_err(|e| fincode_common::Error::Internal(format!("Bad timestamp: {}", e)))?
            .with_timezone(&chrono::Utc),
    })
}

//! Database access for the codification engine
//!
//! SQLite via sqlx. Tables are created on pool initialization; the items
//! of an extraction are embedded in the extraction row as JSON so every
//! write to an aggregate is a single-row, all-or-nothing update.

pub mod aliases;
pub mod extractions;
pub mod item_codes;

use fincode_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Connects to the engine database, creating the file and tables if
/// missing.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Use proper SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Initialize engine tables
///
/// Creates item_codes, item_code_aliases and codified_extractions if they
/// don't exist. Item codes are append-only (deactivated, never deleted).
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS item_codes (
            guid TEXT PRIMARY KEY,
            code TEXT UNIQUE NOT NULL,
            display_name TEXT NOT NULL,
            category TEXT NOT NULL,
            data_type TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS item_code_aliases (
            guid TEXT PRIMARY KEY,
            alias_raw TEXT NOT NULL,
            alias_normalized TEXT NOT NULL,
            canonical_code TEXT NOT NULL,
            canonical_code_id TEXT NOT NULL,
            confidence REAL NOT NULL,
            source TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_aliases_normalized
        ON item_code_aliases(alias_normalized)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS codified_extractions (
            guid TEXT PRIMARY KEY,
            document_id TEXT UNIQUE NOT NULL,
            project_id TEXT,
            items TEXT NOT NULL DEFAULT '[]',
            smart_pass_completed INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (item_codes, item_code_aliases, codified_extractions)");

    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    init_tables(&pool).await.expect("Failed to init tables");
    pool
}

use sqlx::SqlitePool;

use crate::error::StoreError;
use crate::vector::SUPPORTED_DIMS;

/// Table holding every vector of one dimensionality.
pub fn partition_table(dims: usize) -> String {
    format!("vectors_{}", dims)
}

/// Create one partition table (plus helper indexes) per supported dimension.
///
/// Idempotent: every statement is `IF NOT EXISTS`.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
    for &dims in SUPPORTED_DIMS {
        let table = partition_table(dims);

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                embedding BLOB NOT NULL,
                slug TEXT NOT NULL,
                raw_text TEXT NOT NULL,
                filename TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#
        ))
        .execute(pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_filename ON {table}(filename)"
        ))
        .execute(pool)
        .await?;
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_slug ON {table}(slug)"
        ))
        .execute(pool)
        .await?;
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_created_at ON {table}(created_at DESC)"
        ))
        .execute(pool)
        .await?;
    }

    tracing::debug!(partitions = SUPPORTED_DIMS.len(), "vector partitions ready");
    Ok(())
}

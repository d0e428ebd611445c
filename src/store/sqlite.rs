//! SQLite-backed [`VectorStore`].
//!
//! One table per supported dimensionality (`vectors_<dims>`, created by
//! [`run_migrations`](crate::migrate::run_migrations)). Searches stream the
//! partition row by row so the corpus is never held in memory at once.
//! Writes and deletes are serialized through an internal async mutex;
//! reads take no lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use super::{TopK, VectorStore};
use crate::error::StoreError;
use crate::migrate::partition_table;
use crate::models::{SearchResult, VectorRecord};
use crate::vector::{blob_to_vec, cosine_distance, is_supported_dims, vec_to_blob, SUPPORTED_DIMS};

pub struct SqliteVectorStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl SqliteVectorStore {
    /// Wrap a pool whose partitions already exist.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    /// Wrap a pool, creating any missing partitions first.
    pub async fn open(pool: SqlitePool) -> Result<Self, StoreError> {
        crate::migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn partition_for(dims: usize) -> Result<String, StoreError> {
    if is_supported_dims(dims) {
        Ok(partition_table(dims))
    } else {
        Err(StoreError::NoPartition(dims))
    }
}

fn decode_embedding(blob: &[u8], dims: usize) -> Result<Vec<f32>, StoreError> {
    let vec = blob_to_vec(blob)?;
    if vec.len() != dims {
        return Err(StoreError::CorruptVector(format!(
            "expected {} components in vectors_{}, found {}",
            dims,
            dims,
            vec.len()
        )));
    }
    Ok(vec)
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

async fn insert(
    executor: impl sqlx::SqliteExecutor<'_>,
    table: &str,
    record: &VectorRecord,
) -> Result<(), StoreError> {
    sqlx::query(&format!(
        "INSERT INTO {table} (embedding, slug, raw_text, filename, created_at) VALUES (?, ?, ?, ?, ?)"
    ))
    .bind(vec_to_blob(&record.embedding))
    .bind(&record.slug)
    .bind(&record.raw_text)
    .bind(&record.source_filename)
    .bind(record.created_at.timestamp_millis())
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn write(&self, record: &VectorRecord) -> Result<(), StoreError> {
        let table = partition_for(record.embedding.len())?;
        let _guard = self.write_lock.lock().await;
        insert(&self.pool, &table, record).await
    }

    /// One transaction per batch: a batch is either fully written or not at all.
    async fn write_batch(&self, records: &[VectorRecord]) -> Result<(), StoreError> {
        let tables = records
            .iter()
            .map(|r| partition_for(r.embedding.len()))
            .collect::<Result<Vec<_>, _>>()?;

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        for (record, table) in records.iter().zip(&tables) {
            insert(&mut *tx, table, record).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, StoreError> {
        let dims = query.len();
        let table = partition_for(dims)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut top = TopK::new(k);

        let sql = format!(
            "SELECT embedding, slug, raw_text, filename, created_at FROM {table} ORDER BY id"
        );
        let mut rows = sqlx::query(&sql).fetch(&self.pool);
        let mut scanned = 0usize;

        while let Some(row) = rows.try_next().await? {
            scanned += 1;
            let blob: Vec<u8> = row.get("embedding");
            let embedding = decode_embedding(&blob, dims)?;
            let distance = cosine_distance(query, &embedding);
            if !top.admits(distance) {
                continue;
            }
            let created_at: i64 = row.get("created_at");
            top.offer(SearchResult {
                record: VectorRecord {
                    embedding,
                    slug: row.get("slug"),
                    raw_text: row.get("raw_text"),
                    source_filename: row.get("filename"),
                    created_at: from_millis(created_at),
                },
                distance,
            });
        }

        tracing::trace!(table = %table, scanned, k, "partition scanned");
        Ok(top.into_sorted())
    }

    async fn list_files(&self) -> Result<Vec<String>, StoreError> {
        let union = SUPPORTED_DIMS
            .iter()
            .map(|&d| format!("SELECT filename FROM {}", partition_table(d)))
            .collect::<Vec<_>>()
            .join(" UNION ");
        let sql = format!("{union} ORDER BY filename");

        let files: Vec<String> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        Ok(files)
    }

    async fn remove_by_filename(&self, filename: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut failures = Vec::new();
        let mut removed = 0u64;

        for &dims in SUPPORTED_DIMS {
            let table = partition_table(dims);
            match sqlx::query(&format!("DELETE FROM {table} WHERE filename = ?"))
                .bind(filename)
                .execute(&self.pool)
                .await
            {
                Ok(done) => removed += done.rows_affected(),
                Err(e) => {
                    tracing::warn!(table = %table, error = %e, "partition delete failed");
                    failures.push((dims, e.to_string()));
                }
            }
        }

        tracing::info!(filename, removed, "removed file from vector store");
        if failures.is_empty() {
            Ok(())
        } else {
            Err(StoreError::PartialDelete(failures))
        }
    }
}

//! In-memory [`VectorStore`] for tests and callers without a database.
//!
//! Partitions are `Vec`s keyed by dimensionality behind a `tokio` RwLock.
//! Search is the same brute-force cosine scan as the SQLite store.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{TopK, VectorStore};
use crate::error::StoreError;
use crate::models::{SearchResult, VectorRecord};
use crate::vector::{cosine_distance, is_supported_dims};

#[derive(Default)]
pub struct InMemoryVectorStore {
    partitions: RwLock<HashMap<usize, Vec<VectorRecord>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records across all partitions.
    pub async fn len(&self) -> usize {
        self.partitions.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Every stored record in insertion order within each partition.
    pub async fn records(&self) -> Vec<VectorRecord> {
        let partitions = self.partitions.read().await;
        let mut dims: Vec<_> = partitions.keys().copied().collect();
        dims.sort_unstable();
        dims.iter()
            .flat_map(|d| partitions[d].iter().cloned())
            .collect()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn write(&self, record: &VectorRecord) -> Result<(), StoreError> {
        let dims = record.embedding.len();
        if !is_supported_dims(dims) {
            return Err(StoreError::NoPartition(dims));
        }
        self.partitions
            .write()
            .await
            .entry(dims)
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, StoreError> {
        let dims = query.len();
        if !is_supported_dims(dims) {
            return Err(StoreError::NoPartition(dims));
        }

        let partitions = self.partitions.read().await;
        let mut top = TopK::new(k);
        for record in partitions.get(&dims).into_iter().flatten() {
            let distance = cosine_distance(query, &record.embedding);
            if top.admits(distance) {
                top.offer(SearchResult {
                    record: record.clone(),
                    distance,
                });
            }
        }
        Ok(top.into_sorted())
    }

    async fn list_files(&self) -> Result<Vec<String>, StoreError> {
        let partitions = self.partitions.read().await;
        let files: BTreeSet<&str> = partitions
            .values()
            .flatten()
            .map(|r| r.source_filename.as_str())
            .collect();
        Ok(files.into_iter().map(String::from).collect())
    }

    async fn remove_by_filename(&self, filename: &str) -> Result<(), StoreError> {
        let mut partitions = self.partitions.write().await;
        for records in partitions.values_mut() {
            records.retain(|r| r.source_filename != filename);
        }
        Ok(())
    }
}

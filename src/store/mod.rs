//! Partitioned vector storage.
//!
//! The [`VectorStore`] trait defines the four operations the pipeline needs:
//! append records, exhaustive cosine search within one partition, list
//! source files, and bulk delete by source file. Records are partitioned by
//! embedding length; only [`SUPPORTED_DIMS`](crate::vector::SUPPORTED_DIMS)
//! have a partition.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! | Implementation | Use |
//! |----------------|-----|
//! | [`SqliteVectorStore`] | production, one `vectors_<dims>` table per partition |
//! | [`InMemoryVectorStore`] | tests and callers without a database |

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{SearchResult, VectorRecord};

pub use memory::InMemoryVectorStore;
pub use sqlite::SqliteVectorStore;

/// Results kept by a search when the caller does not say otherwise.
pub const DEFAULT_K: usize = 3;

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Append one record to the partition matching its embedding length.
    ///
    /// Unsupported lengths fail with [`StoreError::NoPartition`] and leave
    /// storage untouched.
    async fn write(&self, record: &VectorRecord) -> Result<(), StoreError>;

    /// Append several records. Stops at the first failure; earlier records
    /// stay written.
    async fn write_batch(&self, records: &[VectorRecord]) -> Result<(), StoreError> {
        for record in records {
            self.write(record).await?;
        }
        Ok(())
    }

    /// The `k` closest records to `query` by cosine distance, ascending.
    /// Equal distances keep scan (insertion) order.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, StoreError>;

    /// Distinct source filenames across all partitions, sorted.
    async fn list_files(&self) -> Result<Vec<String>, StoreError>;

    /// Delete every record from `filename` in every partition. A failing
    /// partition does not stop the others; failures are reported together.
    async fn remove_by_filename(&self, filename: &str) -> Result<(), StoreError>;
}

/// Bounded buffer holding the `k` lowest-distance results seen so far,
/// kept sorted ascending.
pub(crate) struct TopK {
    k: usize,
    items: Vec<SearchResult>,
}

impl TopK {
    pub(crate) fn new(k: usize) -> Self {
        Self {
            k,
            items: Vec::with_capacity(k.min(64) + 1),
        }
    }

    /// Offer a candidate. Candidates tied with an existing entry go after it.
    pub(crate) fn offer(&mut self, candidate: SearchResult) {
        if self.k == 0 {
            return;
        }
        if self.items.len() == self.k {
            match self.items.last() {
                Some(worst) if candidate.distance >= worst.distance => return,
                _ => {}
            }
        }
        let pos = self
            .items
            .partition_point(|r| r.distance <= candidate.distance);
        self.items.insert(pos, candidate);
        self.items.truncate(self.k);
    }

    /// Whether a candidate at `distance` could still enter the buffer.
    pub(crate) fn admits(&self, distance: f32) -> bool {
        if self.k == 0 {
            return false;
        }
        self.items.len() < self.k
            || self
                .items
                .last()
                .map_or(true, |worst| distance < worst.distance)
    }

    pub(crate) fn into_sorted(self) -> Vec<SearchResult> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(slug: &str, distance: f32) -> SearchResult {
        SearchResult {
            record: VectorRecord::new(vec![], slug, "", "f.txt"),
            distance,
        }
    }

    fn slugs(v: &[SearchResult]) -> Vec<&str> {
        v.iter().map(|r| r.record.slug.as_str()).collect()
    }

    #[test]
    fn test_top_k_keeps_lowest_sorted() {
        let mut top = TopK::new(3);
        for (slug, d) in [("a", 0.9), ("b", 0.1), ("c", 0.5), ("d", 0.3), ("e", 0.7)] {
            top.offer(result(slug, d));
        }
        assert_eq!(slugs(&top.into_sorted()), vec!["b", "d", "c"]);
    }

    #[test]
    fn test_top_k_ties_keep_scan_order() {
        let mut top = TopK::new(2);
        top.offer(result("first", 0.2));
        top.offer(result("second", 0.2));
        top.offer(result("third", 0.2));
        assert_eq!(slugs(&top.into_sorted()), vec!["first", "second"]);
    }

    #[test]
    fn test_top_k_zero() {
        let mut top = TopK::new(0);
        top.offer(result("a", 0.0));
        assert!(!top.admits(0.0));
        assert!(top.into_sorted().is_empty());
    }

    #[test]
    fn test_admits() {
        let mut top = TopK::new(1);
        assert!(top.admits(5.0));
        top.offer(result("a", 0.5));
        assert!(top.admits(0.4));
        assert!(!top.admits(0.5));
    }
}

//! Vector index trait for storing and searching chunk embeddings.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::document::{Chunk, IndexEntry, QueryResult};
use crate::error::Result;

/// A storage backend for chunk embeddings with similarity search.
///
/// Implementations must allow concurrent searches while never interleaving
/// two writes, establish their dimension on first insert, and break score
/// ties by insertion order (earlier first).
///
/// # Example
///
/// ```rust,ignore
/// use docsage_rag::{InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::new();
/// index.insert(chunk, vector).await?;
/// let results = index.search(&query_vector, 5).await?;
/// ```
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Append one chunk and its vector. No deduplication.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`](crate::RagError::DimensionMismatch)
    /// if the vector length disagrees with the index dimension.
    async fn insert(&self, chunk: Chunk, vector: Vec<f32>) -> Result<IndexEntry>;

    /// Append many chunks so that either all become searchable or none do.
    ///
    /// The default implementation inserts one at a time and is only atomic
    /// if the first failure happens before any insert; backends should
    /// override it.
    async fn insert_batch(&self, items: Vec<(Chunk, Vec<f32>)>) -> Result<Vec<IndexEntry>> {
        let mut entries = Vec::with_capacity(items.len());
        for (chunk, vector) in items {
            entries.push(self.insert(chunk, vector).await?);
        }
        Ok(entries)
    }

    /// Remove every entry belonging to `document_id` and return how many
    /// were removed. Removing nothing is not an error.
    async fn delete_by_document(&self, document_id: &str) -> Result<usize>;

    /// Return up to `k` entries ranked by descending similarity to
    /// `query_vector`.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyIndex`](crate::RagError::EmptyIndex) if no entries exist
    /// - [`RagError::DimensionMismatch`](crate::RagError::DimensionMismatch) on a
    ///   wrong-length query
    async fn search(&self, query_vector: &[f32], k: usize) -> Result<QueryResult>;

    /// Number of entries currently searchable.
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// The established vector dimension, if any.
    async fn dimension(&self) -> Option<usize>;

    /// Entry counts per document id.
    async fn document_ids(&self) -> BTreeMap<String, usize>;
}

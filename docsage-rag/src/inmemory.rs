//! In-memory vector index using cosine similarity.
//!
//! This module provides [`InMemoryVectorIndex`], an exact (brute-force)
//! index backed by a `Vec` protected by a `tokio::sync::RwLock`: searches
//! share the read lock, inserts and deletes take the write lock one at a
//! time. The index can be saved to and restored from a JSON snapshot so a
//! restart does not require re-embedding every document.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::document::{Chunk, IndexEntry, QueryResult, SearchResult};
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::persist::{IndexSnapshot, SnapshotWriter};

#[derive(Debug, Default)]
struct IndexState {
    dimension: Option<usize>,
    entries: Vec<IndexEntry>,
    next_ordinal: u64,
}

impl IndexState {
    fn check_dimension(&self, actual: usize) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != actual => {
                Err(RagError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }

    /// NaN and infinities cannot be ranked and serialize as `null`, which
    /// would leave a snapshot that never restores.
    fn check_finite(vector: &[f32]) -> Result<()> {
        match vector.iter().position(|x| !x.is_finite()) {
            Some(at) => Err(RagError::invalid_input(
                "index",
                format!("vector component {at} is {}", vector[at]),
            )),
            None => Ok(()),
        }
    }

    fn push(&mut self, chunk: Chunk, vector: Vec<f32>) -> IndexEntry {
        self.dimension.get_or_insert(vector.len());
        let entry = IndexEntry { chunk, vector, ordinal: self.next_ordinal };
        self.next_ordinal += 1;
        self.entries.push(entry.clone());
        entry
    }
}

/// An in-memory vector index using cosine similarity for search.
///
/// Entries are kept in insertion order, which doubles as the tie-break for
/// equal scores.
///
/// # Example
///
/// ```rust,ignore
/// use docsage_rag::{InMemoryVectorIndex, VectorIndex};
///
/// let index = InMemoryVectorIndex::with_dimension(384);
/// index.insert(chunk, vector).await?;
/// index.save("data/vectors/index.json").await?;
/// let restored = InMemoryVectorIndex::restore("data/vectors/index.json", 384).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    state: RwLock<IndexState>,
}

impl InMemoryVectorIndex {
    /// Create an empty index whose dimension is set by the first insert.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty index that only accepts vectors of `dimension`.
    pub fn with_dimension(dimension: usize) -> Self {
        Self { state: RwLock::new(IndexState { dimension: Some(dimension), ..Default::default() }) }
    }

    /// Write the index to `path` atomically (temp file, then rename).
    ///
    /// Writers are blocked while the snapshot is taken, searches are not.
    /// Each call writes its own temp file, so overlapping saves to one path
    /// leave whichever snapshot was renamed last.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = {
            let state = self.state.read().await;
            SnapshotWriter::new(state.dimension, &state.entries).to_bytes()?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;

        info!(path = %path.display(), bytes = bytes.len(), "saved vector index");
        Ok(())
    }

    /// Load an index saved with [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// - [`RagError::DimensionMismatch`] if the snapshot was built with a
    ///   model of a different dimension than `expected_dimension`. The
    ///   snapshot is never reconciled; re-ingest instead.
    /// - [`RagError::CorruptIndex`] if the snapshot is internally inconsistent
    /// - [`RagError::Io`] / [`RagError::Serialization`] on read or parse failure
    pub async fn restore(path: impl AsRef<Path>, expected_dimension: usize) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let snapshot: IndexSnapshot = serde_json::from_slice(&bytes)?;
        let index = Self::from_snapshot(snapshot, expected_dimension)?;
        info!(
            path = %path.display(),
            entries = index.state.read().await.entries.len(),
            "restored vector index"
        );
        Ok(index)
    }

    /// Restore from `path` if it exists, otherwise start empty with the
    /// given dimension.
    pub async fn restore_or_new(path: impl AsRef<Path>, expected_dimension: usize) -> Result<Self> {
        let path = path.as_ref();
        if tokio::fs::try_exists(path).await? {
            Self::restore(path, expected_dimension).await
        } else {
            debug!(path = %path.display(), "no saved index, starting empty");
            Ok(Self::with_dimension(expected_dimension))
        }
    }

    fn from_snapshot(snapshot: IndexSnapshot, expected_dimension: usize) -> Result<Self> {
        let entries = snapshot.into_entries(expected_dimension)?;
        let mut state = IndexState { dimension: Some(expected_dimension), ..Default::default() };
        for (chunk, vector) in entries {
            state.push(chunk, vector);
        }
        Ok(Self { state: RwLock::new(state) })
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn insert(&self, chunk: Chunk, vector: Vec<f32>) -> Result<IndexEntry> {
        IndexState::check_finite(&vector)?;
        let mut state = self.state.write().await;
        state.check_dimension(vector.len())?;
        Ok(state.push(chunk, vector))
    }

    async fn insert_batch(&self, items: Vec<(Chunk, Vec<f32>)>) -> Result<Vec<IndexEntry>> {
        for (_, vector) in &items {
            IndexState::check_finite(vector)?;
        }
        let mut state = self.state.write().await;
        let expected = state.dimension.or_else(|| items.first().map(|(_, v)| v.len()));
        if let Some(expected) = expected {
            if let Some((_, bad)) = items.iter().find(|(_, v)| v.len() != expected) {
                return Err(RagError::DimensionMismatch { expected, actual: bad.len() });
            }
        }
        Ok(items.into_iter().map(|(chunk, vector)| state.push(chunk, vector)).collect())
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        let before = state.entries.len();
        state.entries.retain(|entry| entry.document_id() != document_id);
        let removed = before - state.entries.len();
        debug!(document.id = document_id, removed, "deleted index entries");
        Ok(removed)
    }

    async fn search(&self, query_vector: &[f32], k: usize) -> Result<QueryResult> {
        IndexState::check_finite(query_vector)?;
        let state = self.state.read().await;
        state.check_dimension(query_vector.len())?;
        if state.entries.is_empty() {
            return Err(RagError::EmptyIndex);
        }

        let mut scored: Vec<(&IndexEntry, f32)> = state
            .entries
            .iter()
            .map(|entry| (entry, cosine_similarity(&entry.vector, query_vector)))
            .collect();

        scored.sort_by(|(a, a_score), (b, b_score)| {
            b_score.total_cmp(a_score).then_with(|| a.ordinal.cmp(&b.ordinal))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(entry, score)| SearchResult { chunk: entry.chunk.clone(), score })
            .collect())
    }

    async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    async fn dimension(&self) -> Option<usize> {
        self.state.read().await.dimension
    }

    async fn document_ids(&self) -> BTreeMap<String, usize> {
        let state = self.state.read().await;
        let mut counts = BTreeMap::new();
        for entry in &state.entries {
            *counts.entry(entry.document_id().to_string()).or_insert(0) += 1;
        }
        counts
    }
}

//! On-disk layout of a saved vector index.
//!
//! A snapshot is a single JSON object:
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "dimension": 384,
//!   "entry_count": 2,
//!   "entries": [ { "chunk": { "document_id": "...", "sequence_index": 0, "text": "..." }, "vector": [0.1] } ]
//! }
//! ```
//!
//! Entries are stored in insertion order; restoring replays them in that
//! order so score ties resolve exactly as before the save. `f32` values
//! survive the JSON round trip bit-for-bit.

use serde::{Deserialize, Serialize};

use crate::document::{Chunk, IndexEntry};
use crate::error::{RagError, Result};

pub(crate) const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EntryRef<'a> {
    chunk: &'a Chunk,
    vector: &'a [f32],
}

/// Borrowing serializer so saving does not clone the index.
#[derive(Serialize)]
pub(crate) struct SnapshotWriter<'a> {
    format_version: u32,
    dimension: Option<usize>,
    entry_count: usize,
    entries: Vec<EntryRef<'a>>,
}

impl<'a> SnapshotWriter<'a> {
    pub(crate) fn new(dimension: Option<usize>, entries: &'a [IndexEntry]) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            dimension,
            entry_count: entries.len(),
            entries: entries
                .iter()
                .map(|e| EntryRef { chunk: &e.chunk, vector: &e.vector })
                .collect(),
        }
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[derive(Deserialize)]
struct PersistedEntry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// A snapshot read back from disk, not yet validated.
#[derive(Deserialize)]
pub(crate) struct IndexSnapshot {
    format_version: u32,
    dimension: Option<usize>,
    entry_count: usize,
    entries: Vec<PersistedEntry>,
}

impl IndexSnapshot {
    /// Validate against the configured model and hand back the entries in
    /// insertion order.
    pub(crate) fn into_entries(self, expected_dimension: usize) -> Result<Vec<(Chunk, Vec<f32>)>> {
        if self.format_version != FORMAT_VERSION {
            return Err(RagError::CorruptIndex(format!(
                "unsupported format_version {} (expected {FORMAT_VERSION})",
                self.format_version
            )));
        }
        if self.entry_count != self.entries.len() {
            return Err(RagError::CorruptIndex(format!(
                "entry_count says {} but {} entries are present",
                self.entry_count,
                self.entries.len()
            )));
        }

        match self.dimension {
            Some(stored) if stored != expected_dimension => {
                return Err(RagError::DimensionMismatch {
                    expected: expected_dimension,
                    actual: stored,
                });
            }
            None if !self.entries.is_empty() => {
                return Err(RagError::CorruptIndex("entries present without a dimension".into()));
            }
            _ => {}
        }

        if let Some(bad) = self.entries.iter().find(|e| e.vector.len() != expected_dimension) {
            return Err(RagError::CorruptIndex(format!(
                "chunk '{}' has a {}-dimensional vector in a {expected_dimension}-dimensional index",
                bad.chunk.id,
                bad.vector.len()
            )));
        }

        Ok(self.entries.into_iter().map(|e| (e.chunk, e.vector)).collect())
    }
}

//! Data types for documents, chunks, embeddings, and search results.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RagError, Result};

/// Metadata key holding the uploaded file name on every chunk.
pub const SOURCE_FILENAME_KEY: &str = "source_filename";
/// Metadata key holding the 1-based page number a PDF chunk starts on.
pub const PAGE_KEY: &str = "page";
/// Metadata key holding the markdown heading path a chunk starts under.
pub const HEADING_PATH_KEY: &str = "heading_path";

/// The closed set of input formats the normalizer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Markdown,
    Html,
}

impl DocumentFormat {
    /// Map a file extension (without the dot, any case) to a format.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::UnsupportedFormat`] for anything but
    /// `pdf`, `md`, `markdown`, `html` and `htm`.
    pub fn from_extension(extension: &str) -> Result<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "md" | "markdown" => Ok(Self::Markdown),
            "html" | "htm" => Ok(Self::Html),
            other => Err(RagError::UnsupportedFormat(format!("'.{other}' files are not supported"))),
        }
    }

    /// Detect the format from a file name such as `report.PDF`.
    pub fn from_filename(filename: &str) -> Result<Self> {
        let extension = Path::new(filename).extension().and_then(|e| e.to_str()).ok_or_else(|| {
            RagError::UnsupportedFormat(format!("'{filename}' has no file extension"))
        })?;
        Self::from_extension(extension)
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pdf => "PDF",
            Self::Markdown => "Markdown",
            Self::Html => "HTML",
        };
        f.write_str(name)
    }
}

/// Lifecycle of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Registered, not yet searchable.
    Pending,
    /// Every chunk is embedded and in the index.
    Ingested,
    /// Ingestion failed; nothing from this document is in the index.
    Failed,
}

/// An uploaded source document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The name the file was uploaded under.
    pub source_filename: String,
    /// The detected input format.
    pub format: DocumentFormat,
    /// When the document was registered.
    pub uploaded_at: DateTime<Utc>,
    /// Normalized text; chunk spans are character offsets into it.
    pub raw_text: String,
    /// Where the document is in its lifecycle.
    pub status: DocumentStatus,
}

impl Document {
    /// Register a new pending document with a fresh id.
    pub fn new(source_filename: impl Into<String>, format: DocumentFormat) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_filename: source_filename.into(),
            format,
            uploaded_at: Utc::now(),
            raw_text: String::new(),
            status: DocumentStatus::Pending,
        }
    }
}

/// Half-open range of character (not byte) offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharSpan {
    pub start: usize,
    pub end: usize,
}

impl CharSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A contiguous segment of one [`Document`], sized for embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// `{document_id}_{sequence_index}`.
    pub id: String,
    /// The ID of the owning [`Document`].
    pub document_id: String,
    /// Position of this chunk in the document, starting at 0.
    pub sequence_index: usize,
    /// The text content of the chunk.
    pub text: String,
    /// Where the text sits in the document's normalized text.
    pub char_span: CharSpan,
    /// Source file name plus the page or heading path the chunk starts in.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// The vector for one [`Chunk`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Embedding {
    /// The chunk this vector was computed from (lookup only).
    pub chunk_id: String,
    pub vector: Vec<f32>,
}

impl Embedding {
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// The index's record for one chunk.
///
/// Carries enough of the chunk to attribute an answer to its source without
/// re-reading the document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    /// Monotonic insertion ordinal; breaks score ties.
    pub ordinal: u64,
}

impl IndexEntry {
    pub fn document_id(&self) -> &str {
        &self.chunk.document_id
    }

    pub fn embedding(&self) -> Embedding {
        Embedding { chunk_id: self.chunk.id.clone(), vector: self.vector.clone() }
    }
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

/// Search hits ordered by descending score.
pub type QueryResult = Vec<SearchResult>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_formats_case_insensitively() {
        assert_eq!(DocumentFormat::from_filename("Report.PDF").unwrap(), DocumentFormat::Pdf);
        assert_eq!(DocumentFormat::from_filename("notes.md").unwrap(), DocumentFormat::Markdown);
        assert_eq!(
            DocumentFormat::from_filename("README.markdown").unwrap(),
            DocumentFormat::Markdown
        );
        assert_eq!(DocumentFormat::from_filename("page.htm").unwrap(), DocumentFormat::Html);
    }

    #[test]
    fn rejects_unknown_and_missing_extensions() {
        assert!(matches!(
            DocumentFormat::from_filename("sheet.xlsx"),
            Err(RagError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            DocumentFormat::from_filename("Makefile"),
            Err(RagError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn new_documents_start_pending_with_unique_ids() {
        let a = Document::new("a.md", DocumentFormat::Markdown);
        let b = Document::new("a.md", DocumentFormat::Markdown);
        assert_eq!(a.status, DocumentStatus::Pending);
        assert_ne!(a.id, b.id);
    }
}

//! Document question answering over a local vector index.
//!
//! This crate provides:
//! - Normalization of PDF, Markdown and HTML uploads into structured text
//! - Boundary-aware chunking with overlap
//! - An in-memory cosine-similarity index with JSON snapshots
//! - Embedding and generation provider traits, with an offline hashing
//!   embedder and (behind the `openai` and `gemini` features) hosted
//!   model backends
//! - A [`RagPipeline`] tying ingestion, retrieval and answering together

pub mod answer;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod hashing;
#[cfg(any(feature = "openai", feature = "gemini"))]
mod http;
pub mod index;
pub mod inmemory;
pub mod normalize;
mod persist;
pub mod pipeline;
pub mod reranker;
pub mod retriever;

#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "openai")]
pub mod openai;

pub use answer::{Answer, ChatRole, ChatTurn, Grounding, MissingContext, SourceAttribution};
pub use chunking::{BoundaryChunker, Chunker};
pub use config::{ChunkerConfig, NoContextPolicy, RagConfig, RagConfigBuilder};
pub use document::{
    CharSpan, Chunk, Document, DocumentFormat, DocumentStatus, Embedding, IndexEntry,
    QueryResult, SearchResult,
};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use generation::GenerationProvider;
pub use hashing::HashEmbeddingProvider;
pub use index::VectorIndex;
pub use inmemory::InMemoryVectorIndex;
pub use normalize::{NormalizedText, PositionHint, TextBlock, normalize};
pub use pipeline::{
    IngestFailure, IngestReport, IngestedDocument, RagPipeline, RagPipelineBuilder, Upload,
};
pub use reranker::{KeywordBoostReranker, NoOpReranker, Reranker};
pub use retriever::{Retrieval, Retriever};

#[cfg(feature = "openai")]
pub use openai::{OpenAIEmbeddingProvider, OpenAIGenerationProvider};

#[cfg(feature = "gemini")]
pub use gemini::{GeminiEmbeddingProvider, GeminiGenerationProvider};

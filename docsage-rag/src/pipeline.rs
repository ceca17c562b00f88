//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates the full ingest-and-ask workflow by
//! composing an [`EmbeddingProvider`], a [`VectorIndex`], a [`Chunker`],
//! an optional [`GenerationProvider`] and an optional [`Reranker`].
//!
//! # Example
//!
//! ```rust,ignore
//! use docsage_rag::{HashEmbeddingProvider, InMemoryVectorIndex, RagConfig, RagPipeline};
//! use tokio_util::sync::CancellationToken;
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(HashEmbeddingProvider::default()))
//!     .index(Arc::new(InMemoryVectorIndex::with_dimension(384)))
//!     .generation_provider(Arc::new(my_model))
//!     .build()?;
//!
//! let cancel = CancellationToken::new();
//! pipeline.ingest("guide.md", &bytes, &cancel).await?;
//! let answer = pipeline.ask("How do I restore the index?").await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::answer::{Answer, ChatRole, ChatTurn, Grounding, MissingContext, SourceAttribution};
use crate::chunking::{BoundaryChunker, Chunker};
use crate::config::{NoContextPolicy, RagConfig};
use crate::document::{
    Chunk, Document, DocumentFormat, DocumentStatus, SOURCE_FILENAME_KEY, SearchResult,
};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::GenerationProvider;
use crate::index::VectorIndex;
use crate::normalize::{check_cancelled, normalize};
use crate::reranker::Reranker;
use crate::retriever::{Retrieval, Retriever};

/// A raw file handed to [`RagPipeline::ingest_batch`].
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self { filename: filename.into(), bytes: bytes.into() }
    }
}

/// A document that made it into the index.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestedDocument {
    pub document: Document,
    pub chunk_count: usize,
}

/// An upload that did not make it into the index.
#[derive(Debug)]
pub struct IngestFailure {
    pub filename: String,
    pub error: RagError,
}

/// Outcome of [`RagPipeline::ingest_batch`].
#[derive(Debug, Default)]
pub struct IngestReport {
    pub ingested: Vec<IngestedDocument>,
    pub failed: Vec<IngestFailure>,
}

impl IngestReport {
    pub fn chunk_count(&self) -> usize {
        self.ingested.iter().map(|d| d.chunk_count).sum()
    }
}

/// The RAG pipeline orchestrator.
///
/// Coordinates document ingestion (normalize → chunk → embed → index) and
/// question answering (embed → search → rerank → filter → generate).
/// Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    generation_provider: Option<Arc<dyn GenerationProvider>>,
    chunker: Arc<dyn Chunker>,
    retriever: Retriever,
    documents: RwLock<HashMap<String, Document>>,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        self.retriever.index()
    }

    /// Look up a document registered by this pipeline.
    pub async fn document(&self, id: &str) -> Option<Document> {
        self.documents.read().await.get(id).cloned()
    }

    /// All registered documents, oldest upload first.
    pub async fn documents(&self) -> Vec<Document> {
        let mut documents: Vec<Document> = self.documents.read().await.values().cloned().collect();
        documents.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at));
        documents
    }

    /// Ingest one file: normalize → chunk → embed → index.
    ///
    /// The document is registered as `Pending` first and ends up either
    /// `Ingested` with every chunk searchable, or `Failed` with nothing in
    /// the index.
    ///
    /// # Errors
    ///
    /// - [`RagError::UnsupportedFormat`] if the extension is not recognized
    /// - [`RagError::CorruptDocument`] / [`RagError::EncryptedDocument`] from
    ///   normalization, or when the document has no text at all
    /// - [`RagError::Cancelled`] if `cancel` fires before the chunks are indexed
    /// - embedding provider errors, unchanged
    /// - [`RagError::DimensionMismatch`] if the provider disagrees with the index
    pub async fn ingest(
        &self,
        filename: &str,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<IngestedDocument> {
        let format = DocumentFormat::from_filename(filename).map_err(|e| {
            warn!(filename, error = %e, "rejected upload");
            e
        })?;

        let document = Document::new(filename, format);
        let document_id = document.id.clone();
        info!(document.id = %document_id, filename, %format, bytes = bytes.len(), "ingesting document");
        self.documents.write().await.insert(document_id.clone(), document);

        let prepared = match self.prepare(&document_id, filename, format, bytes, cancel).await {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(document.id = %document_id, error = %e, "ingestion failed");
                self.mark_failed(&document_id).await;
                return Err(e);
            }
        };

        self.commit(&document_id, prepared).await
    }

    /// Ingest several files, continuing past per-file failures.
    ///
    /// Once `cancel` fires, every upload not yet finished is reported as
    /// failed with [`RagError::Cancelled`].
    pub async fn ingest_batch(
        &self,
        uploads: Vec<Upload>,
        cancel: &CancellationToken,
    ) -> IngestReport {
        let mut report = IngestReport::default();
        for upload in uploads {
            if cancel.is_cancelled() {
                report.failed.push(IngestFailure { filename: upload.filename, error: RagError::Cancelled });
                continue;
            }
            match self.ingest(&upload.filename, &upload.bytes, cancel).await {
                Ok(ingested) => report.ingested.push(ingested),
                Err(error) => {
                    warn!(filename = %upload.filename, error = %error, "skipping document");
                    report.failed.push(IngestFailure { filename: upload.filename, error });
                }
            }
        }
        info!(
            ingested = report.ingested.len(),
            failed = report.failed.len(),
            chunk_count = report.chunk_count(),
            "batch ingestion finished"
        );
        report
    }

    /// Remove a document and every chunk derived from it.
    ///
    /// Returns the number of index entries removed; deleting an unknown
    /// document removes nothing and succeeds.
    pub async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let mut documents = self.documents.write().await;
        let removed = self.index().delete_by_document(document_id).await?;
        documents.remove(document_id);
        info!(document.id = document_id, removed, "deleted document");
        Ok(removed)
    }

    /// Retrieve the configured `top_k` passages for `query`.
    pub async fn retrieve(&self, query: &str) -> Result<Retrieval> {
        self.retriever.retrieve(query, self.config.top_k, self.embedding_provider.as_ref()).await
    }

    /// Answer a standalone question from the indexed documents.
    ///
    /// # Errors
    ///
    /// - [`RagError::ConfigError`] if no generation provider is configured
    /// - retrieval and generation provider errors, unchanged
    pub async fn ask(&self, query: &str) -> Result<Answer> {
        self.answer(query, &[]).await
    }

    /// Answer a question in the context of an ongoing conversation.
    ///
    /// Retrieval uses `query` alone; the last `history_turns` turns are
    /// prepended to the question the model sees.
    pub async fn ask_follow_up(&self, query: &str, history: &[ChatTurn]) -> Result<Answer> {
        self.answer(query, history).await
    }

    async fn answer(&self, query: &str, history: &[ChatTurn]) -> Result<Answer> {
        let generator = self.generation_provider.as_ref().ok_or_else(|| {
            RagError::ConfigError("no generation provider configured".to_string())
        })?;

        let retrieval = self.retrieve(query).await?;
        let question = self.question_with_history(query, history);

        let (passages, grounding) = match retrieval {
            Retrieval::Relevant(results) => {
                let passages = self.select_context(results);
                let grounding = Grounding::Retrieved { passages_used: passages.len() };
                (passages, grounding)
            }
            Retrieval::NoRelevantContext { best_score } => {
                debug!(best_score = ?best_score, "no passage cleared the score floor");
                match self.no_context(MissingContext::NothingRelevant) {
                    Some(grounding) => (Vec::new(), grounding),
                    None => return Ok(Answer::refusal(MissingContext::NothingRelevant)),
                }
            }
            Retrieval::EmptyIndex => match self.no_context(MissingContext::EmptyIndex) {
                Some(grounding) => (Vec::new(), grounding),
                None => return Ok(Answer::refusal(MissingContext::EmptyIndex)),
            },
        };

        let context: Vec<String> = passages.iter().map(|r| r.chunk.text.clone()).collect();
        debug!(passages = context.len(), history_turns = history.len(), "calling generation provider");
        let text = generator.generate(&question, &context).await.map_err(|e| {
            error!(error = %e, "generation failed");
            e
        })?;

        info!(passages = context.len(), answer_len = text.len(), "answered question");
        Ok(Answer { text, sources: passages.iter().map(SourceAttribution::from).collect(), grounding })
    }

    /// `None` means refuse without calling the model.
    fn no_context(&self, reason: MissingContext) -> Option<Grounding> {
        match self.config.no_context_policy {
            NoContextPolicy::Refuse => {
                info!(?reason, "refusing to answer without context");
                None
            }
            NoContextPolicy::AnswerWithoutContext => Some(Grounding::ModelOnly { reason }),
        }
    }

    /// Keep passages best-first while they fit in `max_context_chars`. The
    /// best passage is always kept.
    fn select_context(&self, results: Vec<SearchResult>) -> Vec<SearchResult> {
        let budget = self.config.max_context_chars;
        let mut used = 0;
        let mut selected = Vec::with_capacity(results.len());
        for result in results {
            let len = result.chunk.text.chars().count();
            if !selected.is_empty() && used + len > budget {
                debug!(budget, used, dropped_len = len, "context budget reached");
                break;
            }
            used += len;
            selected.push(result);
        }
        selected
    }

    fn question_with_history(&self, query: &str, history: &[ChatTurn]) -> String {
        let skip = history.len().saturating_sub(self.config.history_turns);
        let recent = &history[skip..];
        if recent.is_empty() {
            return query.to_string();
        }

        let mut question = String::from("Previous conversation:\n");
        for turn in recent {
            let speaker = match turn.role {
                ChatRole::User => "User",
                ChatRole::Assistant => "Assistant",
            };
            question.push_str(&format!("{speaker}: {}\n", turn.content));
        }
        question.push_str(&format!("\nFollow-up question: {query}"));
        question
    }

    /// Everything up to (not including) touching the index.
    async fn prepare(
        &self,
        document_id: &str,
        filename: &str,
        format: DocumentFormat,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<Prepared> {
        let normalized = normalize(bytes, format, cancel)?;
        if normalized.is_empty() {
            return Err(RagError::CorruptDocument("no text content".to_string()));
        }
        let raw_text = normalized.text();

        let mut chunks = self.chunker.chunk(document_id, &normalized, cancel)?;
        if chunks.is_empty() {
            return Err(RagError::CorruptDocument("no text content".to_string()));
        }
        for chunk in &mut chunks {
            chunk.metadata.insert(SOURCE_FILENAME_KEY.to_string(), filename.to_string());
        }
        debug!(document.id = document_id, chunk_count = chunks.len(), "chunked document");

        let vectors = self.embed_chunks(document_id, &chunks, cancel).await?;
        Ok(Prepared { raw_text, items: chunks.into_iter().zip(vectors).collect() })
    }

    async fn embed_chunks(
        &self,
        document_id: &str,
        chunks: &[Chunk],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.config.embed_batch_size) {
            check_cancelled(cancel)?;
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let embedded = self.embedding_provider.embed_batch(&texts).await?;
            if embedded.len() != batch.len() {
                return Err(RagError::invalid_input(
                    "embedding",
                    format!("returned {} vectors for {} chunks", embedded.len(), batch.len()),
                ));
            }
            debug!(document.id = document_id, batch_size = batch.len(), "embedded batch");
            vectors.extend(embedded);
        }
        Ok(vectors)
    }

    async fn commit(&self, document_id: &str, prepared: Prepared) -> Result<IngestedDocument> {
        // Held across the insert so a concurrent delete cannot slip between
        // the existence check and the chunks becoming searchable.
        let mut documents = self.documents.write().await;
        if !documents.contains_key(document_id) {
            warn!(document.id = document_id, "document deleted during ingestion");
            return Err(RagError::Cancelled);
        }

        let chunk_count = prepared.items.len();
        if let Err(e) = self.index().insert_batch(prepared.items).await {
            error!(document.id = document_id, error = %e, "index insert failed");
            if let Some(document) = documents.get_mut(document_id) {
                document.status = DocumentStatus::Failed;
            }
            return Err(e);
        }

        let document = documents
            .get_mut(document_id)
            .ok_or_else(|| RagError::CorruptIndex(format!("document '{document_id}' vanished")))?;
        document.raw_text = prepared.raw_text;
        document.status = DocumentStatus::Ingested;
        info!(document.id = document_id, chunk_count, "ingested document");
        Ok(IngestedDocument { document: document.clone(), chunk_count })
    }

    async fn mark_failed(&self, document_id: &str) {
        if let Some(document) = self.documents.write().await.get_mut(document_id) {
            document.status = DocumentStatus::Failed;
        }
    }
}

struct Prepared {
    raw_text: String,
    items: Vec<(Chunk, Vec<f32>)>,
}

/// Builder for constructing a [`RagPipeline`].
///
/// `config`, `embedding_provider` and `index` are required. Without a
/// chunker, a [`BoundaryChunker`] is built from `config.chunking`.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(RagConfig::default())
///     .embedding_provider(Arc::new(embedder))
///     .index(Arc::new(index))
///     .generation_provider(Arc::new(model))   // optional
///     .reranker(Arc::new(reranker))           // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    generation_provider: Option<Arc<dyn GenerationProvider>>,
    index: Option<Arc<dyn VectorIndex>>,
    chunker: Option<Arc<dyn Chunker>>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl RagPipelineBuilder {
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    pub fn generation_provider(mut self, provider: Arc<dyn GenerationProvider>) -> Self {
        self.generation_provider = Some(provider);
        self
    }

    pub fn index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Override the chunker built from `config.chunking`.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set an optional reranker applied between search and the score floor.
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Build the [`RagPipeline`], validating the config and that all
    /// required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any required field is missing or
    /// the config is invalid.
    pub fn build(self) -> Result<RagPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let index =
            self.index.ok_or_else(|| RagError::ConfigError("index is required".to_string()))?;
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(BoundaryChunker::new(config.chunking.clone())?),
        };
        let retriever =
            Retriever::new(index).with_min_score(config.min_score).with_reranker(self.reranker);

        Ok(RagPipeline {
            config,
            embedding_provider,
            generation_provider: self.generation_provider,
            chunker,
            retriever,
            documents: RwLock::new(HashMap::new()),
        })
    }
}

//! Query-time retrieval: embed, search, rerank, filter.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::document::QueryResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::reranker::Reranker;

/// Outcome of a retrieval.
///
/// "Nothing relevant" and "nothing indexed" are different answers: the
/// caller may want to answer from model knowledge in one case and tell the
/// user to upload documents in the other.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    /// At least one passage cleared the score floor, best first.
    Relevant(QueryResult),
    /// The index had entries but every hit scored below `min_score`.
    NoRelevantContext {
        /// Score of the best hit that was dropped.
        best_score: Option<f32>,
    },
    /// The index holds no entries at all.
    EmptyIndex,
}

impl Retrieval {
    /// The retrieved passages, empty for both "no context" outcomes.
    pub fn results(&self) -> &[crate::document::SearchResult] {
        match self {
            Self::Relevant(results) => results,
            Self::NoRelevantContext { .. } | Self::EmptyIndex => &[],
        }
    }

    pub fn is_relevant(&self) -> bool {
        matches!(self, Self::Relevant(_))
    }
}

/// Embeds queries and searches a [`VectorIndex`].
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    min_score: Option<f32>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl Retriever {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self { index, min_score: None, reranker: None }
    }

    /// Drop hits scoring below `score`.
    pub fn with_min_score(mut self, score: Option<f32>) -> Self {
        self.min_score = score;
        self
    }

    pub fn with_reranker(mut self, reranker: Option<Arc<dyn Reranker>>) -> Self {
        self.reranker = reranker;
        self
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Retrieve up to `k` passages for `query`.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidInput`] for a blank query
    /// - provider errors from embedding, unchanged so callers can tell
    ///   transient from permanent failures
    /// - [`RagError::DimensionMismatch`] if the provider and index disagree
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        embedding_provider: &dyn EmbeddingProvider,
    ) -> Result<Retrieval> {
        if query.trim().is_empty() {
            return Err(RagError::invalid_input("retriever", "query must not be blank"));
        }

        let query_vector = embedding_provider.embed(query).await.map_err(|e| {
            error!(error = %e, "embedding failed during query");
            e
        })?;

        let results = match self.index.search(&query_vector, k).await {
            Ok(results) => results,
            Err(RagError::EmptyIndex) => {
                info!("query against empty index");
                return Ok(Retrieval::EmptyIndex);
            }
            Err(e) => {
                error!(error = %e, "vector index search failed");
                return Err(e);
            }
        };

        let results = match &self.reranker {
            Some(reranker) => reranker.rerank(query, results).await?,
            None => results,
        };

        let best_score = results.first().map(|r| r.score);
        let hit_count = results.len();
        let relevant: QueryResult = match self.min_score {
            Some(floor) => results.into_iter().filter(|r| r.score >= floor).collect(),
            None => results,
        };
        debug!(hit_count, kept = relevant.len(), min_score = ?self.min_score, "filtered hits");

        if relevant.is_empty() {
            info!(best_score = ?best_score, "no relevant context");
            return Ok(Retrieval::NoRelevantContext { best_score });
        }

        info!(result_count = relevant.len(), "retrieval completed");
        Ok(Retrieval::Relevant(relevant))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::document::{CharSpan, Chunk};
    use crate::inmemory::InMemoryVectorIndex;

    /// Returns a fixed vector regardless of input.
    struct FixedEmbedding(Vec<f32>);

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedding {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }

        fn dimensions(&self) -> usize {
            self.0.len()
        }
    }

    struct Unavailable;

    #[async_trait]
    impl EmbeddingProvider for Unavailable {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(RagError::unavailable("test", "down for maintenance"))
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    fn chunk(n: usize) -> Chunk {
        Chunk {
            id: format!("d_{n}"),
            document_id: "d".into(),
            sequence_index: n,
            text: format!("passage {n}"),
            char_span: CharSpan::new(0, 9),
            metadata: Default::default(),
        }
    }

    async fn index_with(vectors: &[[f32; 2]]) -> Arc<dyn VectorIndex> {
        let index = InMemoryVectorIndex::new();
        for (i, v) in vectors.iter().enumerate() {
            index.insert(chunk(i), v.to_vec()).await.unwrap();
        }
        Arc::new(index)
    }

    #[tokio::test]
    async fn returns_hits_best_first() {
        let retriever = Retriever::new(index_with(&[[0.0, 1.0], [1.0, 0.0]]).await);
        let retrieval = retriever.retrieve("q", 2, &FixedEmbedding(vec![1.0, 0.0])).await.unwrap();
        let order: Vec<usize> = retrieval.results().iter().map(|r| r.chunk.sequence_index).collect();
        assert_eq!(order, vec![1, 0]);
    }

    #[tokio::test]
    async fn score_floor_yields_no_relevant_context() {
        let retriever =
            Retriever::new(index_with(&[[0.0, 1.0]]).await).with_min_score(Some(0.5));
        let retrieval = retriever.retrieve("q", 3, &FixedEmbedding(vec![1.0, 0.0])).await.unwrap();
        assert_eq!(retrieval, Retrieval::NoRelevantContext { best_score: Some(0.0) });
    }

    #[tokio::test]
    async fn floor_keeps_only_passing_hits() {
        let retriever = Retriever::new(index_with(&[[0.0, 1.0], [1.0, 0.0], [0.9, 0.1]]).await)
            .with_min_score(Some(0.5));
        let retrieval = retriever.retrieve("q", 3, &FixedEmbedding(vec![1.0, 0.0])).await.unwrap();
        assert_eq!(retrieval.results().len(), 2);
    }

    #[tokio::test]
    async fn empty_index_is_its_own_signal() {
        let retriever = Retriever::new(Arc::new(InMemoryVectorIndex::with_dimension(2)));
        let retrieval = retriever.retrieve("q", 3, &FixedEmbedding(vec![1.0, 0.0])).await.unwrap();
        assert_eq!(retrieval, Retrieval::EmptyIndex);
    }

    #[tokio::test]
    async fn blank_query_is_invalid_input() {
        let retriever = Retriever::new(index_with(&[[1.0, 0.0]]).await);
        let err = retriever.retrieve("   ", 3, &FixedEmbedding(vec![1.0, 0.0])).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn provider_errors_pass_through_unchanged() {
        let retriever = Retriever::new(index_with(&[[1.0, 0.0]]).await);
        let err = retriever.retrieve("q", 3, &Unavailable).await.unwrap_err();
        assert!(err.is_transient());
    }
}

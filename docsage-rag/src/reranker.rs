//! Reranker trait for re-scoring retrieved passages.

use async_trait::async_trait;

use crate::document::SearchResult;
use crate::error::Result;

/// A reranker that re-scores and reorders search results.
///
/// Runs after vector search and before the `min_score` floor, so a reranker
/// that rescales scores also moves what the floor means.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Rerank search results given the original query.
    ///
    /// Returns results in a new order with potentially updated scores.
    async fn rerank(&self, query: &str, results: Vec<SearchResult>) -> Result<Vec<SearchResult>>;
}

/// A no-op reranker that returns results unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReranker;

#[async_trait]
impl Reranker for NoOpReranker {
    async fn rerank(&self, _query: &str, results: Vec<SearchResult>) -> Result<Vec<SearchResult>> {
        Ok(results)
    }
}

/// Boosts passages that literally contain query terms.
///
/// Each hit gains `weight` times the fraction of distinct query words
/// (three or more characters, case-insensitive) found in its text, then
/// results are re-sorted. Ties keep their incoming order.
#[derive(Debug, Clone, Copy)]
pub struct KeywordBoostReranker {
    weight: f32,
}

impl KeywordBoostReranker {
    pub fn new(weight: f32) -> Self {
        Self { weight }
    }
}

impl Default for KeywordBoostReranker {
    fn default() -> Self {
        Self { weight: 0.1 }
    }
}

#[async_trait]
impl Reranker for KeywordBoostReranker {
    async fn rerank(&self, query: &str, results: Vec<SearchResult>) -> Result<Vec<SearchResult>> {
        let mut terms: Vec<String> = query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() >= 3)
            .map(str::to_lowercase)
            .collect();
        terms.sort();
        terms.dedup();
        if terms.is_empty() {
            return Ok(results);
        }

        let mut boosted: Vec<SearchResult> = results
            .into_iter()
            .map(|mut result| {
                let text = result.chunk.text.to_lowercase();
                let hits = terms.iter().filter(|t| text.contains(t.as_str())).count();
                result.score += self.weight * hits as f32 / terms.len() as f32;
                result
            })
            .collect();
        // Stable sort: equal scores keep vector-search order.
        boosted.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(boosted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{CharSpan, Chunk};

    fn result(text: &str, score: f32) -> SearchResult {
        SearchResult {
            chunk: Chunk {
                id: text.to_string(),
                document_id: "d".to_string(),
                sequence_index: 0,
                text: text.to_string(),
                char_span: CharSpan::new(0, text.len()),
                metadata: Default::default(),
            },
            score,
        }
    }

    #[tokio::test]
    async fn noop_keeps_order_and_scores() {
        let input = vec![result("a", 0.9), result("b", 0.5)];
        let output = NoOpReranker.rerank("q", input.clone()).await.unwrap();
        assert_eq!(output, input);
    }

    #[tokio::test]
    async fn keyword_matches_can_overtake_closer_vectors() {
        let input = vec![result("unrelated prose", 0.80), result("restore the index", 0.75)];
        let output = KeywordBoostReranker::new(0.2).rerank("restore index", input).await.unwrap();
        assert_eq!(output[0].chunk.text, "restore the index");
        assert!((output[0].score - 0.95).abs() < 1e-6);
        assert_eq!(output[1].score, 0.80);
    }
}

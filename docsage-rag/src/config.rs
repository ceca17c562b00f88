//! Configuration for chunking, retrieval and answer generation.
//!
//! Chunk sizes and overlap are deliberately configuration rather than
//! constants: the defaults (1000 / 150 characters) suit typical embedding
//! models but are not a contract.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Options recognized by the [`Chunker`](crate::Chunker).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Maximum chunk size in characters.
    pub max_chunk_chars: usize,
    /// Characters repeated from the end of one chunk at the start of the next.
    pub overlap_chars: usize,
    /// Prefer cutting at block and sentence ends over hard cuts.
    pub respect_boundaries: bool,
    /// Hard-cut at `max_chunk_chars` when no boundary is near. When `false`,
    /// chunks extend to the next boundary and may exceed the maximum.
    pub hard_split: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self { max_chunk_chars: 1000, overlap_chars: 150, respect_boundaries: true, hard_split: true }
    }
}

impl ChunkerConfig {
    /// Check that the sizes can make progress.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `max_chunk_chars == 0` or
    /// `overlap_chars >= max_chunk_chars`.
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_chars == 0 {
            return Err(RagError::ConfigError("max_chunk_chars must be greater than zero".into()));
        }
        if self.overlap_chars >= self.max_chunk_chars {
            return Err(RagError::ConfigError(format!(
                "overlap_chars ({}) must be less than max_chunk_chars ({})",
                self.overlap_chars, self.max_chunk_chars
            )));
        }
        Ok(())
    }
}

/// What to do when retrieval finds nothing worth sending to the model.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoContextPolicy {
    /// Reply with a fixed refusal and skip the generation call.
    #[default]
    Refuse,
    /// Ask the model anyway, with no passages.
    AnswerWithoutContext,
}

/// Configuration parameters for the RAG pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// How documents are split.
    pub chunking: ChunkerConfig,
    /// Number of top results to return from vector search.
    pub top_k: usize,
    /// Hits scoring below this are dropped before generation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,
    /// Upper bound on the characters of context passed to the model.
    pub max_context_chars: usize,
    /// Prior chat turns included in follow-up questions.
    pub history_turns: usize,
    /// Chunk texts sent per embedding request.
    pub embed_batch_size: usize,
    pub no_context_policy: NoContextPolicy,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkerConfig::default(),
            top_k: 5,
            min_score: None,
            max_context_chars: 8000,
            history_turns: 5,
            embed_batch_size: 100,
            no_context_policy: NoContextPolicy::Refuse,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Validate a config obtained without the builder (e.g. deserialized).
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.embed_batch_size == 0 {
            return Err(RagError::ConfigError(
                "embed_batch_size must be greater than zero".to_string(),
            ));
        }
        if let Some(score) = self.min_score.filter(|s| !s.is_finite()) {
            return Err(RagError::ConfigError(format!("min_score must be finite, got {score}")));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn max_chunk_chars(mut self, size: usize) -> Self {
        self.config.chunking.max_chunk_chars = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn overlap_chars(mut self, overlap: usize) -> Self {
        self.config.chunking.overlap_chars = overlap;
        self
    }

    pub fn respect_boundaries(mut self, respect: bool) -> Self {
        self.config.chunking.respect_boundaries = respect;
        self
    }

    pub fn hard_split(mut self, hard_split: bool) -> Self {
        self.config.chunking.hard_split = hard_split;
        self
    }

    /// Set the number of top results to return from vector search.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity score for retrieved passages.
    pub fn min_score(mut self, score: f32) -> Self {
        self.config.min_score = Some(score);
        self
    }

    pub fn max_context_chars(mut self, chars: usize) -> Self {
        self.config.max_context_chars = chars;
        self
    }

    pub fn history_turns(mut self, turns: usize) -> Self {
        self.config.history_turns = turns;
        self
    }

    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    pub fn no_context_policy(mut self, policy: NoContextPolicy) -> Self {
        self.config.no_context_policy = policy;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `max_chunk_chars == 0` or `overlap_chars >= max_chunk_chars`
    /// - `top_k == 0` or `embed_batch_size == 0`
    /// - `min_score` is NaN or infinite
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RagConfig::builder().build().unwrap();
        assert_eq!(config.chunking.max_chunk_chars, 1000);
        assert_eq!(config.chunking.overlap_chars, 150);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.min_score, None);
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk() {
        let err = RagConfig::builder().max_chunk_chars(100).overlap_chars(100).build().unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }

    #[test]
    fn rejects_zero_top_k_and_nan_score() {
        assert!(RagConfig::builder().top_k(0).build().is_err());
        assert!(RagConfig::builder().min_score(f32::NAN).build().is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: RagConfig =
            serde_json::from_str(r#"{"top_k": 8, "chunking": {"overlap_chars": 50}}"#).unwrap();
        assert_eq!(config.top_k, 8);
        assert_eq!(config.chunking.overlap_chars, 50);
        assert_eq!(config.chunking.max_chunk_chars, 1000);
        assert_eq!(config.no_context_policy, NoContextPolicy::Refuse);
    }
}

//! Offline feature-hashing embedding provider.
//!
//! [`HashEmbeddingProvider`] needs no model or network: every lower-cased
//! word is hashed with SHA-256 into one signed bucket of the output vector,
//! and the result is L2-normalized. Texts sharing vocabulary land close
//! together, which is enough for demos, tests and air-gapped use.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// Deterministic bag-of-words embeddings via the hashing trick.
///
/// # Example
///
/// ```rust,ignore
/// use docsage_rag::{EmbeddingProvider, HashEmbeddingProvider};
///
/// let provider = HashEmbeddingProvider::new(256)?;
/// let a = provider.embed("vector index persistence").await?;
/// let b = provider.embed("persisting the vector index").await?;
/// ```
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dimensions: usize,
}

impl HashEmbeddingProvider {
    pub const DEFAULT_DIMENSIONS: usize = 384;

    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `dimensions == 0`.
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(RagError::ConfigError("embedding dimensions must be positive".into()));
        }
        Ok(Self { dimensions })
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .map(str::to_lowercase);

        for token in tokens {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self { dimensions: Self::DEFAULT_DIMENSIONS }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = "hash", text_len = text.len(), "embedding single text");
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        debug!(provider = "hash", batch_size = texts.len(), "embedding batch");
        Ok(texts.iter().map(|text| self.embed_sync(text)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn embeddings_are_deterministic_and_normalized() {
        let provider = HashEmbeddingProvider::new(64).unwrap();
        let a = provider.embed("The quick brown fox").await.unwrap();
        let b = provider.embed("the QUICK brown fox!").await.unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        assert!((dot(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn shared_vocabulary_scores_higher() {
        let provider = HashEmbeddingProvider::default();
        let query = provider.embed("restore the vector index").await.unwrap();
        let related = provider.embed("how to restore a vector index from disk").await.unwrap();
        let unrelated = provider.embed("bananas grow in tropical climates").await.unwrap();
        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[tokio::test]
    async fn punctuation_only_text_is_the_zero_vector() {
        let provider = HashEmbeddingProvider::new(8).unwrap();
        let v = provider.embed("... !!!").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        assert!(matches!(HashEmbeddingProvider::new(0), Err(RagError::ConfigError(_))));
    }
}

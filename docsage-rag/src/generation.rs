//! Generation provider trait for producing answers from retrieved context.

use async_trait::async_trait;

use crate::error::Result;

/// A language model that answers a question from supplied passages.
///
/// Passages arrive best-first. Implementations own the prompt wording.
///
/// # Errors
///
/// Implementations report failures as
/// [`RagError::ProviderUnavailable`](crate::RagError::ProviderUnavailable),
/// [`RagError::RateLimited`](crate::RagError::RateLimited) or
/// [`RagError::ContextTooLarge`](crate::RagError::ContextTooLarge).
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Answer `query` using `context_chunks` as the only source material.
    async fn generate(&self, query: &str, context_chunks: &[String]) -> Result<String>;
}

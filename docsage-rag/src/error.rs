//! Error types for the `docsage-rag` crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while ingesting documents, maintaining the index,
/// or talking to model providers.
#[derive(Debug, Error)]
pub enum RagError {
    /// The document format is not one of PDF, Markdown or HTML.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The document could not be parsed or contains no usable text.
    #[error("Corrupt document: {0}")]
    CorruptDocument(String),

    /// The document is password-protected.
    #[error("Encrypted document: password-protected files cannot be indexed")]
    EncryptedDocument,

    /// Ingestion was abandoned through its cancellation token.
    #[error("Ingestion cancelled")]
    Cancelled,

    /// A vector's length disagrees with the index dimension.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimension established by the index (or the configured model).
        expected: usize,
        /// The dimension that was supplied.
        actual: usize,
    },

    /// A search was issued against an index with no entries.
    #[error("Index is empty")]
    EmptyIndex,

    /// A persisted index snapshot is internally inconsistent.
    #[error("Corrupt index snapshot: {0}")]
    CorruptIndex(String),

    /// The provider could not be reached or failed on its side.
    #[error("Provider unavailable ({provider}): {message}")]
    ProviderUnavailable {
        /// The provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The provider rejected the call because of rate limiting.
    #[error("Rate limited ({provider}): {message}")]
    RateLimited {
        /// The provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
        /// How long the provider asked callers to wait, when it said so.
        retry_after: Option<Duration>,
    },

    /// The provider rejected the input itself.
    #[error("Invalid input ({provider}): {message}")]
    InvalidInput {
        /// The provider (or component) that rejected the input.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The prompt plus retrieved context exceeded the model's window.
    #[error("Context too large ({provider}): {message}")]
    ContextTooLarge {
        /// The provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Filesystem failure while saving or restoring an index.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Whether retrying the same call later may succeed.
    ///
    /// Only provider-side conditions are transient; bad input, oversized
    /// context and every ingestion or index error are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::ProviderUnavailable { .. })
    }

    #[cfg(any(feature = "openai", feature = "gemini", test))]
    pub(crate) fn unavailable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderUnavailable { provider: provider.into(), message: message.into() }
    }

    pub(crate) fn invalid_input(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput { provider: provider.into(), message: message.into() }
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

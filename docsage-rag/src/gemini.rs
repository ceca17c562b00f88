//! Gemini embedding and generation providers.
//!
//! This module is only available when the `gemini` feature is enabled.
//! Requests go to the Generative Language REST API with `reqwest`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::GenerationProvider;
use crate::http::{
    MAX_INPUTS_PER_REQUEST, MAX_TOKENS, TEMPERATURE, api_key_from_env, check_api_key,
    check_status, parse_error, system_prompt, transport_error,
};

const PROVIDER: &str = "Gemini";

const API_KEY_VAR: &str = "GEMINI_API_KEY";

const API_KEY_HEADER: &str = "x-goog-api-key";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const DEFAULT_EMBEDDING_MODEL: &str = "gemini-embedding-001";

/// Full output size of `gemini-embedding-001`.
const DEFAULT_DIMENSIONS: usize = 3072;

const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";

/// How the embedding will be used; Gemini tunes the vector for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
    SemanticSimilarity,
}

/// An [`EmbeddingProvider`] backed by the Gemini embedding API.
///
/// # Configuration
///
/// - `task_type` – defaults to [`TaskType::RetrievalDocument`]. Override
///   with [`GeminiEmbeddingProvider::with_task_type`].
/// - `output_dimensionality` – optional truncation of the output vector.
///
/// # Example
///
/// ```rust,ignore
/// use docsage_rag::gemini::GeminiEmbeddingProvider;
///
/// let provider = GeminiEmbeddingProvider::new("your-api-key")?.with_output_dimensionality(768);
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct GeminiEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    task_type: TaskType,
    output_dimensionality: Option<usize>,
    dimensions: usize,
}

impl GeminiEmbeddingProvider {
    /// Create a new provider using the given API key and the default
    /// `gemini-embedding-001` model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        check_api_key(PROVIDER, &api_key)?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            task_type: TaskType::RetrievalDocument,
            output_dimensionality: None,
            dimensions: DEFAULT_DIMENSIONS,
        })
    }

    /// Create a new provider using the `GEMINI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(api_key_from_env(PROVIDER, API_KEY_VAR)?)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the task type used for embedding requests.
    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }

    /// Set the output dimensionality (truncates the embedding vector).
    pub fn with_output_dimensionality(mut self, dims: usize) -> Self {
        self.output_dimensionality = Some(dims);
        self.dimensions = dims;
        self
    }

    fn batch_request(&self, texts: &[&str]) -> BatchEmbedRequest {
        let model = format!("models/{}", self.model);
        BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|&text| EmbedContentRequest {
                    model: model.clone(),
                    content: Content::text(text),
                    task_type: self.task_type,
                    output_dimensionality: self.output_dimensionality,
                })
                .collect(),
        }
    }

    async fn embed_request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(format!("{}/models/{}:batchEmbedContents", self.base_url, self.model))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&self.batch_request(texts))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        let response = check_status(PROVIDER, response).await?;

        let parsed: BatchEmbedResponse =
            response.json().await.map_err(|e| parse_error(PROVIDER, e))?;
        if parsed.embeddings.len() != texts.len() {
            return Err(RagError::unavailable(
                PROVIDER,
                format!(
                    "API returned {} embeddings for {} inputs",
                    parsed.embeddings.len(),
                    texts.len()
                ),
            ));
        }
        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }
}

/// A [`GenerationProvider`] backed by Gemini `generateContent`.
///
/// Passages and grounding instructions go in the system instruction; the
/// question is the single user turn.
pub struct GeminiGenerationProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiGenerationProvider {
    /// Create a new provider with the given API key and `gemini-2.5-flash`.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        check_api_key(PROVIDER, &api_key)?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_CHAT_MODEL.into(),
        })
    }

    /// Create a new provider using the `GEMINI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(api_key_from_env(PROVIDER, API_KEY_VAR)?)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

// ── Gemini API request/response types ──────────────────────────────

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(text: &str) -> Self {
        Self { role: None, parts: vec![Part { text: Some(text.to_string()) }] }
    }

    fn user(text: &str) -> Self {
        Self { role: Some("user".into()), ..Self::text(text) }
    }

    fn joined_text(self) -> String {
        self.parts.into_iter().filter_map(|p| p.text).collect()
    }
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest {
    model: String,
    content: Content,
    task_type: TaskType,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

fn generate_request(query: &str, context_chunks: &[String]) -> GenerateContentRequest {
    GenerateContentRequest {
        system_instruction: Content::text(&system_prompt(context_chunks)),
        contents: vec![Content::user(&format!("Question: {query}"))],
        generation_config: GenerationConfig {
            temperature: TEMPERATURE,
            max_output_tokens: MAX_TOKENS,
        },
    }
}

// ── Provider implementations ───────────────────────────────────────

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        self.embed_request(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::unavailable(PROVIDER, "API returned empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let mut embeddings = Vec::with_capacity(texts.len());
        for request in texts.chunks(MAX_INPUTS_PER_REQUEST) {
            embeddings.extend(self.embed_request(request).await?);
        }
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[async_trait]
impl GenerationProvider for GeminiGenerationProvider {
    async fn generate(&self, query: &str, context_chunks: &[String]) -> Result<String> {
        debug!(
            provider = PROVIDER,
            model = %self.model,
            passages = context_chunks.len(),
            "generating answer"
        );

        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&generate_request(query, context_chunks))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;
        let response = check_status(PROVIDER, response).await?;

        let parsed: GenerateContentResponse =
            response.json().await.map_err(|e| parse_error(PROVIDER, e))?;
        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(Content::joined_text)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| RagError::unavailable(PROVIDER, "API returned no candidates"))
    }
}

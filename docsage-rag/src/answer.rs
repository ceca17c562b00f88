//! Answers, their source attributions, and chat history.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::{SOURCE_FILENAME_KEY, SearchResult};

/// Characters of chunk text quoted in a [`SourceAttribution`].
const EXCERPT_CHARS: usize = 100;

/// Who said a [`ChatTurn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One message of an ongoing conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// Why an answer carries no retrieved context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingContext {
    /// Nothing scored above the configured floor.
    NothingRelevant,
    /// No document has been indexed.
    EmptyIndex,
}

/// How an [`Answer`] relates to the indexed documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Grounding {
    /// The model answered from retrieved passages.
    Retrieved { passages_used: usize },
    /// The model answered without passages.
    ModelOnly { reason: MissingContext },
    /// No model call was made; the text is a fixed refusal.
    Refused { reason: MissingContext },
}

impl Grounding {
    pub fn is_grounded(&self) -> bool {
        matches!(self, Self::Retrieved { .. })
    }
}

/// Points an answer back at the chunk it drew on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAttribution {
    pub document_id: String,
    pub source_filename: String,
    pub sequence_index: usize,
    /// The first hundred characters of the chunk.
    pub excerpt: String,
    pub score: f32,
}

impl From<&SearchResult> for SourceAttribution {
    fn from(result: &SearchResult) -> Self {
        let chunk = &result.chunk;
        Self {
            document_id: chunk.document_id.clone(),
            source_filename: chunk
                .metadata
                .get(SOURCE_FILENAME_KEY)
                .cloned()
                .unwrap_or_else(|| chunk.document_id.clone()),
            sequence_index: chunk.sequence_index,
            excerpt: chunk.text.chars().take(EXCERPT_CHARS).collect(),
            score: result.score,
        }
    }
}

impl fmt::Display for SourceAttribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Chunk {} of {}: \"{}...\" (Relevance: {:.2})",
            self.sequence_index, self.source_filename, self.excerpt, self.score
        )
    }
}

/// A generated (or refused) answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    /// The passages sent to the model, best first.
    pub sources: Vec<SourceAttribution>,
    pub grounding: Grounding,
}

impl Answer {
    pub(crate) const NOTHING_RELEVANT: &'static str =
        "I couldn't find relevant information in the indexed documents to answer your question.";
    pub(crate) const NOTHING_INDEXED: &'static str =
        "No documents have been indexed yet. Upload a document before asking questions.";

    pub(crate) fn refusal(reason: MissingContext) -> Self {
        let text = match reason {
            MissingContext::NothingRelevant => Self::NOTHING_RELEVANT,
            MissingContext::EmptyIndex => Self::NOTHING_INDEXED,
        };
        Self { text: text.to_string(), sources: Vec::new(), grounding: Grounding::Refused { reason } }
    }
}

//! Document normalization.
//!
//! Every supported [`DocumentFormat`] is turned into the same
//! format-agnostic [`NormalizedText`]: an ordered list of text blocks, each
//! tagged with where it came from (page, heading path, or block ordinal),
//! plus document-level metadata. Block ends are the natural split points the
//! [`Chunker`](crate::Chunker) prefers.
//!
//! Normalization has no side effects; persisting the result is up to the
//! caller.

mod html;
mod markdown;
mod pdf;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::document::{CharSpan, DocumentFormat};
use crate::error::{RagError, Result};

/// Where a block sits in its source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PositionHint {
    /// A PDF page, 1-based.
    Page { number: u32 },
    /// A markdown block under the given heading path (`A > B > C`, empty
    /// before the first heading).
    Section { heading_path: String },
    /// An HTML block-level element, in document order.
    Block { ordinal: usize },
}

/// One block of plain text and its position hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
    pub hint: PositionHint,
}

/// Format-agnostic output of [`normalize`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedText {
    pub blocks: Vec<TextBlock>,
    /// Document-level facts such as `page_count` or `title`.
    pub metadata: HashMap<String, String>,
}

impl NormalizedText {
    /// Separator placed between blocks in [`text`](Self::text).
    pub const BLOCK_SEPARATOR: &'static str = "\n\n";

    /// Build from blocks, dropping whitespace-only ones.
    pub fn from_blocks(blocks: impl IntoIterator<Item = TextBlock>) -> Self {
        let mut normalized = Self::default();
        for block in blocks {
            normalized.push_block(block.text, block.hint);
        }
        normalized
    }

    /// Append a block; the text is trimmed and empty blocks are ignored.
    pub fn push_block(&mut self, text: impl AsRef<str>, hint: PositionHint) {
        let text = text.as_ref().trim();
        if !text.is_empty() {
            self.blocks.push(TextBlock { text: text.to_string(), hint });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The whole document as one string, blocks separated by a blank line.
    pub fn text(&self) -> String {
        self.blocks.iter().map(|b| b.text.as_str()).collect::<Vec<_>>().join(Self::BLOCK_SEPARATOR)
    }

    /// Character span of every block inside [`text`](Self::text).
    pub fn block_spans(&self) -> Vec<CharSpan> {
        let separator = Self::BLOCK_SEPARATOR.chars().count();
        let mut spans = Vec::with_capacity(self.blocks.len());
        let mut offset = 0;
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                offset += separator;
            }
            let len = block.text.chars().count();
            spans.push(CharSpan::new(offset, offset + len));
            offset += len;
        }
        spans
    }
}

/// Convert raw bytes of the given format into [`NormalizedText`].
///
/// The token is checked between pages or blocks so an abandoned upload stops
/// early.
///
/// # Errors
///
/// - [`RagError::EncryptedDocument`] for password-protected PDFs
/// - [`RagError::CorruptDocument`] for unparseable PDFs and non-UTF-8 text formats
/// - [`RagError::Cancelled`] if the token fires
pub fn normalize(
    raw: &[u8],
    format: DocumentFormat,
    cancel: &CancellationToken,
) -> Result<NormalizedText> {
    let normalized = match format {
        DocumentFormat::Pdf => pdf::normalize_pdf(raw, cancel)?,
        DocumentFormat::Markdown => markdown::normalize_markdown(decode_utf8(raw)?, cancel)?,
        DocumentFormat::Html => html::normalize_html(decode_utf8(raw)?, cancel)?,
    };
    debug!(%format, blocks = normalized.blocks.len(), "normalized document");
    Ok(normalized)
}

fn decode_utf8(raw: &[u8]) -> Result<&str> {
    std::str::from_utf8(raw)
        .map_err(|e| RagError::CorruptDocument(format!("document is not valid UTF-8: {e}")))
}

pub(crate) fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() { Err(RagError::Cancelled) } else { Ok(()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(text: &str) -> TextBlock {
        TextBlock { text: text.to_string(), hint: PositionHint::Block { ordinal: 0 } }
    }

    #[test]
    fn block_spans_index_into_joined_text() {
        let normalized = NormalizedText::from_blocks([block("héllo"), block("world")]);
        let text = normalized.text();
        let chars: Vec<char> = text.chars().collect();
        let spans = normalized.block_spans();
        assert_eq!(text, "héllo\n\nworld");
        for (span, block) in spans.iter().zip(&normalized.blocks) {
            let slice: String = chars[span.start..span.end].iter().collect();
            assert_eq!(slice, block.text);
        }
    }

    #[test]
    fn whitespace_blocks_are_dropped() {
        let normalized = NormalizedText::from_blocks([block("  "), block(" kept "), block("\n")]);
        assert_eq!(normalized.blocks.len(), 1);
        assert_eq!(normalized.blocks[0].text, "kept");
    }

    #[test]
    fn non_utf8_text_formats_are_corrupt() {
        let cancel = CancellationToken::new();
        let err = normalize(&[0xff, 0xfe, 0x00], DocumentFormat::Markdown, &cancel).unwrap_err();
        assert!(matches!(err, RagError::CorruptDocument(_)));
    }

    #[test]
    fn cancelled_token_stops_normalization() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = normalize(b"# Title\n\nBody", DocumentFormat::Markdown, &cancel).unwrap_err();
        assert!(matches!(err, RagError::Cancelled));
    }
}

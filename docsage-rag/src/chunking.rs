//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`BoundaryChunker`], which
//! splits [`NormalizedText`] into overlapping windows of at most
//! `max_chunk_chars` characters, preferring block ends, then sentence ends,
//! and hard-cutting only when no boundary is close enough.
//!
//! Chunks are substrings of [`NormalizedText::text`] and record their
//! character span in it, so the original text can be rebuilt by dropping
//! each chunk's overlap with its predecessor.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::config::ChunkerConfig;
use crate::document::{CharSpan, Chunk, HEADING_PATH_KEY, PAGE_KEY};
use crate::error::Result;
use crate::normalize::{NormalizedText, PositionHint, check_cancelled};

/// A strategy for splitting normalized documents into chunks.
///
/// Implementations must keep source order, number chunks from 0, and return
/// an empty `Vec` for empty input.
pub trait Chunker: Send + Sync {
    /// Split a normalized document into chunks owned by `document_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Cancelled`](crate::RagError::Cancelled) if the
    /// token fires between chunks.
    fn chunk(
        &self,
        document_id: &str,
        normalized: &NormalizedText,
        cancel: &CancellationToken,
    ) -> Result<Vec<Chunk>>;
}

/// Greedy block-accumulating chunker with character overlap.
///
/// For a window starting at `start`, with `limit = start + max_chunk_chars`:
///
/// 1. the last block end before `limit` is used if there is one;
/// 2. otherwise the last sentence end within the look-back window
///    (the final fifth of the window);
/// 3. otherwise a hard cut at `limit`.
///
/// A single block longer than `max_chunk_chars` skips step 2 and is hard
/// split. The next window starts `overlap_chars` before the cut.
///
/// # Example
///
/// ```rust,ignore
/// use docsage_rag::{BoundaryChunker, Chunker, ChunkerConfig};
///
/// let chunker = BoundaryChunker::new(ChunkerConfig::default())?;
/// let chunks = chunker.chunk(&document.id, &normalized, &cancel)?;
/// ```
#[derive(Debug, Clone)]
pub struct BoundaryChunker {
    config: ChunkerConfig,
}

impl BoundaryChunker {
    /// Create a chunker, validating the sizes.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`](crate::RagError::ConfigError) if
    /// `overlap_chars >= max_chunk_chars` or `max_chunk_chars == 0`.
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// End (exclusive) of the chunk that starts at `start`.
    fn cut_point(&self, chars: &[char], spans: &[CharSpan], start: usize) -> usize {
        let total = chars.len();
        let max = self.config.max_chunk_chars;
        let limit = start + max;
        if limit >= total {
            return total;
        }
        // Anything at or before this leaves the next window where this one began.
        let min_cut = start + self.config.overlap_chars;

        if self.config.respect_boundaries {
            if let Some(end) =
                spans.iter().rev().map(|s| s.end).find(|&end| end > min_cut && end <= limit)
            {
                return end;
            }

            let oversized_block = spans
                .iter()
                .find(|s| s.start < limit && limit <= s.end)
                .is_some_and(|s| s.len() > max);
            if !oversized_block {
                let window_start = limit.saturating_sub(max / 5).max(min_cut + 1);
                if let Some(end) = last_sentence_end(chars, window_start, limit) {
                    return end;
                }
            }
        }

        if self.config.hard_split {
            return limit;
        }
        next_boundary_after(chars, spans, limit).unwrap_or(total)
    }
}

impl Default for BoundaryChunker {
    fn default() -> Self {
        Self { config: ChunkerConfig::default() }
    }
}

impl Chunker for BoundaryChunker {
    fn chunk(
        &self,
        document_id: &str,
        normalized: &NormalizedText,
        cancel: &CancellationToken,
    ) -> Result<Vec<Chunk>> {
        if normalized.is_empty() {
            return Ok(Vec::new());
        }

        let chars: Vec<char> = normalized.text().chars().collect();
        let spans = normalized.block_spans();
        let mut chunks = Vec::new();
        let mut start = 0;
        // First character not repeated from the previous chunk.
        let mut content_start = 0;

        loop {
            check_cancelled(cancel)?;
            let end = self.cut_point(&chars, &spans, start);
            let sequence_index = chunks.len();

            chunks.push(Chunk {
                id: format!("{document_id}_{sequence_index}"),
                document_id: document_id.to_string(),
                sequence_index,
                text: chars[start..end].iter().collect(),
                char_span: CharSpan::new(start, end),
                metadata: position_metadata(normalized, &spans, content_start),
            });

            if end >= chars.len() {
                break;
            }
            start = end - self.config.overlap_chars;
            content_start = end;
        }

        Ok(chunks)
    }
}

/// Exclusive end of the last sentence terminator in `[from, to]`.
fn last_sentence_end(chars: &[char], from: usize, to: usize) -> Option<usize> {
    (from.max(1)..=to).rev().find(|&end| is_sentence_end(chars, end))
}

fn next_boundary_after(chars: &[char], spans: &[CharSpan], after: usize) -> Option<usize> {
    let block_end = spans.iter().map(|s| s.end).find(|&end| end > after);
    let sentence_end = (after + 1..chars.len()).find(|&end| is_sentence_end(chars, end));
    match (block_end, sentence_end) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn is_sentence_end(chars: &[char], end: usize) -> bool {
    end > 0
        && matches!(chars[end - 1], '.' | '!' | '?')
        && chars.get(end).is_none_or(|c| c.is_whitespace())
}

/// Page number or heading path of the block holding the chunk's first new
/// (non-overlapping) character.
fn position_metadata(
    normalized: &NormalizedText,
    spans: &[CharSpan],
    content_start: usize,
) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    let block =
        spans.iter().position(|s| s.end > content_start).and_then(|i| normalized.blocks.get(i));
    match block.map(|b| &b.hint) {
        Some(PositionHint::Page { number }) => {
            metadata.insert(PAGE_KEY.to_string(), number.to_string());
        }
        Some(PositionHint::Section { heading_path }) if !heading_path.is_empty() => {
            metadata.insert(HEADING_PATH_KEY.to_string(), heading_path.clone());
        }
        _ => {}
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::TextBlock;

    fn chunker(max: usize, overlap: usize) -> BoundaryChunker {
        BoundaryChunker::new(ChunkerConfig {
            max_chunk_chars: max,
            overlap_chars: overlap,
            ..ChunkerConfig::default()
        })
        .unwrap()
    }

    fn blocks(texts: &[&str]) -> NormalizedText {
        NormalizedText::from_blocks(texts.iter().enumerate().map(|(i, t)| TextBlock {
            text: t.to_string(),
            hint: PositionHint::Block { ordinal: i },
        }))
    }

    fn run(chunker: &BoundaryChunker, normalized: &NormalizedText) -> Vec<Chunk> {
        chunker.chunk("doc", normalized, &CancellationToken::new()).unwrap()
    }

    #[test]
    fn dense_block_is_hard_split_into_three() {
        let text: String = "abcdefghij".repeat(250);
        let chunks = run(&chunker(1000, 150), &blocks(&[&text]));

        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 1000);
        }
        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].text.chars().collect();
            let tail: String = prev[prev.len() - 150..].iter().collect();
            assert!(pair[1].text.starts_with(&tail));
        }
        assert_eq!(chunks[2].char_span, CharSpan::new(1700, 2500));
    }

    #[test]
    fn hard_split_ignores_sentences_inside_oversized_block() {
        let text = "Short sentence. ".repeat(40);
        let chunks = run(&chunker(100, 10), &blocks(&[text.trim_end()]));
        assert_eq!(chunks[0].char_span, CharSpan::new(0, 100));
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(run(&chunker(100, 10), &NormalizedText::default()).is_empty());
    }

    #[test]
    fn small_document_is_one_chunk() {
        let chunks = run(&chunker(100, 10), &blocks(&["alpha", "beta"]));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "alpha\n\nbeta");
        assert_eq!(chunks[0].id, "doc_0");
    }

    #[test]
    fn cuts_at_block_ends_when_blocks_fit() {
        let a = "a".repeat(40);
        let b = "b".repeat(40);
        let c = "c".repeat(40);
        let chunks = run(&chunker(100, 10), &blocks(&[&a, &b, &c]));

        // a(0..40) sep b(42..82) sep c(84..124): first cut at the end of b.
        assert_eq!(chunks[0].char_span, CharSpan::new(0, 82));
        assert_eq!(chunks[1].char_span, CharSpan::new(72, 124));
        assert_eq!(chunks.iter().map(|c| c.sequence_index).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn falls_back_to_sentence_end_within_look_back() {
        // A 97-char block with a sentence ending 81 chars in.
        let text = format!("{}. {}", "x".repeat(80), "y".repeat(15));
        let chunks = run(&chunker(100, 10), &blocks(&["intro", &text]));

        // "intro" ends at 5, not past the overlap, so no block end qualifies;
        // the sentence ends at 7 + 81 = 88, inside the look-back [80, 100].
        assert_eq!(chunks[0].char_span.end, 88);
        assert!(chunks[0].text.ends_with('.'));
    }

    #[test]
    fn hard_cut_when_no_boundary_is_near() {
        // The only sentence end (28) is outside the look-back window.
        let text = format!("{}. {}", "x".repeat(20), "y".repeat(77));
        let chunks = run(&chunker(100, 10), &blocks(&["intro", &text]));
        assert_eq!(chunks[0].char_span.end, 100);
    }

    #[test]
    fn ignoring_boundaries_is_a_plain_sliding_window() {
        let config = ChunkerConfig {
            max_chunk_chars: 50,
            overlap_chars: 5,
            respect_boundaries: false,
            hard_split: true,
        };
        let chunker = BoundaryChunker::new(config).unwrap();
        let chunks = run(&chunker, &blocks(&["one two three.", "four five six.", "seven eight"]));
        assert_eq!(chunks[0].char_span, CharSpan::new(0, 43));
        assert_eq!(chunks.len(), 1);

        let long = "z".repeat(120);
        let chunks = run(&chunker, &blocks(&[&long]));
        let spans: Vec<CharSpan> = chunks.iter().map(|c| c.char_span).collect();
        assert_eq!(
            spans,
            vec![CharSpan::new(0, 50), CharSpan::new(45, 95), CharSpan::new(90, 120)]
        );
    }

    #[test]
    fn disabling_hard_split_extends_to_next_boundary() {
        let config = ChunkerConfig {
            max_chunk_chars: 50,
            overlap_chars: 5,
            respect_boundaries: true,
            hard_split: false,
        };
        let chunker = BoundaryChunker::new(config).unwrap();
        let text = format!("{}. tail", "w".repeat(79));
        let chunks = run(&chunker, &blocks(&[&text]));
        assert_eq!(chunks[0].char_span, CharSpan::new(0, 80));
        assert!(chunks[0].text.chars().count() > 50);
    }

    #[test]
    fn chunks_carry_page_and_heading_metadata() {
        let pages = NormalizedText::from_blocks([
            TextBlock { text: "p".repeat(60), hint: PositionHint::Page { number: 1 } },
            TextBlock { text: "q".repeat(60), hint: PositionHint::Page { number: 2 } },
        ]);
        let chunks = run(&chunker(70, 5), &pages);
        assert_eq!(chunks[0].metadata.get(PAGE_KEY).map(String::as_str), Some("1"));
        assert_eq!(chunks[1].metadata.get(PAGE_KEY).map(String::as_str), Some("2"));

        let sections = NormalizedText::from_blocks([TextBlock {
            text: "body".into(),
            hint: PositionHint::Section { heading_path: "Guide > Install".into() },
        }]);
        let chunks = run(&chunker(70, 5), &sections);
        assert_eq!(
            chunks[0].metadata.get(HEADING_PATH_KEY).map(String::as_str),
            Some("Guide > Install")
        );
    }

    #[test]
    fn cancellation_is_checked_between_chunks() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = chunker(100, 10).chunk("doc", &blocks(&["text"]), &cancel).unwrap_err();
        assert!(matches!(err, crate::RagError::Cancelled));
    }

    #[test]
    fn multibyte_text_is_split_on_characters() {
        let text = "é".repeat(250);
        let chunks = run(&chunker(100, 20), &blocks(&[&text]));
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 100));
        assert_eq!(chunks[0].text.chars().count(), 100);
    }
}

//! Property tests for boundary-aware chunking.

use docsage_rag::chunking::{BoundaryChunker, Chunker};
use docsage_rag::config::ChunkerConfig;
use docsage_rag::document::Chunk;
use docsage_rag::normalize::{NormalizedText, PositionHint};
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

/// Blocks of words and sentences, some long enough to need splitting.
fn arb_document() -> impl Strategy<Value = NormalizedText> {
    proptest::collection::vec("[a-zé]{1,12}([ ,][a-zé]{1,12}){0,40}[.!?]?", 1..12).prop_map(
        |blocks| {
            let mut normalized = NormalizedText::default();
            for (ordinal, text) in blocks.iter().enumerate() {
                normalized.push_block(text, PositionHint::Block { ordinal });
            }
            normalized
        },
    )
}

fn arb_config() -> impl Strategy<Value = ChunkerConfig> {
    (20usize..300, any::<bool>(), any::<bool>()).prop_flat_map(
        |(max_chunk_chars, respect_boundaries, hard_split)| {
            (0..max_chunk_chars / 2).prop_map(move |overlap_chars| ChunkerConfig {
                max_chunk_chars,
                overlap_chars,
                respect_boundaries,
                hard_split,
            })
        },
    )
}

/// Glue chunks back together, dropping each chunk's overlap with the one
/// before it.
fn reconstruct(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    let mut covered = 0;
    for chunk in chunks {
        let skip = covered - chunk.char_span.start;
        text.extend(chunk.text.chars().skip(skip));
        covered = chunk.char_span.end;
    }
    text
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// *For any* document and valid config, removing overlaps and joining
    /// the chunks reproduces the normalized text exactly.
    #[test]
    fn chunks_rebuild_the_document(normalized in arb_document(), config in arb_config()) {
        let chunker = BoundaryChunker::new(config.clone()).unwrap();
        let chunks = chunker.chunk("doc", &normalized, &CancellationToken::new()).unwrap();
        let text = normalized.text();

        prop_assert_eq!(reconstruct(&chunks), text.clone());

        let total = text.chars().count();
        prop_assert_eq!(chunks.first().map(|c| c.char_span.start), Some(0));
        prop_assert_eq!(chunks.last().map(|c| c.char_span.end), Some(total));
        for (i, chunk) in chunks.iter().enumerate() {
            prop_assert_eq!(chunk.sequence_index, i);
            prop_assert_eq!(chunk.text.chars().count(), chunk.char_span.len());
        }
        for pair in chunks.windows(2) {
            prop_assert!(pair[1].char_span.start > pair[0].char_span.start);
            prop_assert_eq!(pair[1].char_span.start, pair[0].char_span.end - config.overlap_chars);
        }
    }

    /// *For any* document, hard splitting keeps every chunk within the
    /// configured maximum.
    #[test]
    fn hard_split_respects_max_size(normalized in arb_document(), config in arb_config()) {
        let config = ChunkerConfig { hard_split: true, ..config };
        let chunker = BoundaryChunker::new(config.clone()).unwrap();
        let chunks = chunker.chunk("doc", &normalized, &CancellationToken::new()).unwrap();
        for chunk in &chunks {
            prop_assert!(
                chunk.char_span.len() <= config.max_chunk_chars,
                "chunk {} has {} chars",
                chunk.sequence_index,
                chunk.char_span.len()
            );
        }
    }
}

#[test]
fn default_sizes_split_a_2500_character_block_into_three() {
    let mut normalized = NormalizedText::default();
    normalized.push_block("0123456789".repeat(250), PositionHint::Block { ordinal: 0 });

    let chunks = BoundaryChunker::default()
        .chunk("doc", &normalized, &CancellationToken::new())
        .unwrap();
    let spans: Vec<(usize, usize)> =
        chunks.iter().map(|c| (c.char_span.start, c.char_span.end)).collect();
    assert_eq!(spans, vec![(0, 1000), (850, 1850), (1700, 2500)]);
}

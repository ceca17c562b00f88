//! PDF normalization against documents built with `lopdf`.

use std::sync::Arc;

use docsage_rag::config::ChunkerConfig;
use docsage_rag::document::PAGE_KEY;
use docsage_rag::{
    DocumentFormat, EmbeddingProvider, HashEmbeddingProvider, InMemoryVectorIndex, PositionHint,
    RagConfig, RagError, RagPipeline, VectorIndex, normalize,
};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use tokio_util::sync::CancellationToken;

/// A document with one line of Courier text per page.
fn pdf_document(pages: &[&str]) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

fn to_bytes(mut doc: Document) -> Vec<u8> {
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

const PAGES: [&str; 2] = ["Hello page one", "Second page here"];

#[test]
fn each_page_becomes_a_numbered_block() {
    let bytes = to_bytes(pdf_document(&PAGES));
    let out = normalize(&bytes, DocumentFormat::Pdf, &CancellationToken::new()).unwrap();

    assert_eq!(out.metadata.get("page_count").map(String::as_str), Some("2"));
    assert_eq!(out.blocks.len(), 2);
    assert_eq!(out.blocks[0].hint, PositionHint::Page { number: 1 });
    assert_eq!(out.blocks[1].hint, PositionHint::Page { number: 2 });
    assert!(out.blocks[0].text.contains("Hello page one"), "got {:?}", out.blocks[0].text);
    assert!(out.blocks[1].text.contains("Second page here"), "got {:?}", out.blocks[1].text);
}

#[test]
fn encryption_dictionary_in_trailer_is_reported() {
    let mut doc = pdf_document(&PAGES);
    let encrypt_id = doc.add_object(dictionary! {
        "Filter" => "Standard",
        "V" => 1,
        "R" => 2,
        "O" => Object::string_literal(vec![0u8; 32]),
        "U" => Object::string_literal(vec![0u8; 32]),
        "P" => -4,
    });
    doc.trailer.set("Encrypt", encrypt_id);
    doc.trailer.set("ID", vec![Object::string_literal(vec![1u8; 16]), Object::string_literal(vec![1u8; 16])]);

    let bytes = to_bytes(doc);
    let err = normalize(&bytes, DocumentFormat::Pdf, &CancellationToken::new()).unwrap_err();
    assert!(matches!(err, RagError::EncryptedDocument), "got {err:?}");
}

#[test]
fn cancelled_before_the_first_page_stops() {
    let bytes = to_bytes(pdf_document(&PAGES));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = normalize(&bytes, DocumentFormat::Pdf, &cancel).unwrap_err();
    assert!(matches!(err, RagError::Cancelled));
}

#[tokio::test]
async fn ingested_pdf_chunks_carry_their_page() {
    const DIM: usize = 64;
    let index = Arc::new(InMemoryVectorIndex::with_dimension(DIM));
    let embedder = Arc::new(HashEmbeddingProvider::new(DIM).unwrap());
    let config = RagConfig {
        chunking: ChunkerConfig {
            max_chunk_chars: 20,
            overlap_chars: 0,
            respect_boundaries: true,
            hard_split: true,
        },
        ..Default::default()
    };
    let pipeline = RagPipeline::builder()
        .config(config)
        .embedding_provider(embedder.clone())
        .index(index.clone())
        .build()
        .unwrap();

    let bytes = to_bytes(pdf_document(&PAGES));
    let ingested = pipeline.ingest("manual.pdf", &bytes, &CancellationToken::new()).await.unwrap();
    assert!(ingested.chunk_count >= 2);

    let query = embedder.embed("Second page here").await.unwrap();
    let mut chunks: Vec<_> =
        index.search(&query, 100).await.unwrap().into_iter().map(|r| r.chunk).collect();
    chunks.sort_by_key(|chunk| chunk.sequence_index);

    assert!(chunks.iter().all(|chunk| chunk.metadata.contains_key(PAGE_KEY)));
    assert_eq!(chunks.first().unwrap().metadata[PAGE_KEY], "1");
    assert_eq!(chunks.last().unwrap().metadata[PAGE_KEY], "2");
    assert_eq!(chunks.last().unwrap().metadata["source_filename"], "manual.pdf");
}

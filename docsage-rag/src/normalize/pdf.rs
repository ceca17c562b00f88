use lopdf::Document as PdfDocument;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{NormalizedText, PositionHint, check_cancelled};
use crate::error::{RagError, Result};

/// Extract text page by page; each non-blank page becomes one block.
pub(super) fn normalize_pdf(raw: &[u8], cancel: &CancellationToken) -> Result<NormalizedText> {
    let document = PdfDocument::load_mem(raw).map_err(|e| classify_load_error(&e.to_string()))?;
    if document.is_encrypted() {
        return Err(RagError::EncryptedDocument);
    }

    let pages = document.get_pages();
    let mut output = NormalizedText::default();
    output.metadata.insert("page_count".to_string(), pages.len().to_string());

    let mut failed_pages = 0;
    for &number in pages.keys() {
        check_cancelled(cancel)?;
        match document.extract_text(&[number]) {
            Ok(text) => output.push_block(clean_page_text(&text), PositionHint::Page { number }),
            Err(e) => {
                warn!(page = number, error = %e, "skipping unreadable pdf page");
                failed_pages += 1;
            }
        }
    }

    if failed_pages > 0 && failed_pages == pages.len() {
        return Err(RagError::CorruptDocument(format!(
            "text could not be extracted from any of {failed_pages} pages"
        )));
    }
    Ok(output)
}

/// Distinguish password protection from plain corruption in a load failure.
fn classify_load_error(message: &str) -> RagError {
    let lowered = message.to_ascii_lowercase();
    if ["encrypt", "decrypt", "password"].iter().any(|needle| lowered.contains(needle)) {
        RagError::EncryptedDocument
    } else {
        RagError::CorruptDocument(format!("unable to parse PDF: {message}"))
    }
}

/// Trim each line, collapse inner runs of whitespace, and drop blank lines.
fn clean_page_text(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

use scraper::{ElementRef, Html, Node, Selector};
use tokio_util::sync::CancellationToken;

use super::{NormalizedText, PositionHint, check_cancelled};
use crate::error::Result;

/// Elements whose content never reaches the index.
const SKIPPED_ELEMENTS: &[&str] =
    &["head", "script", "style", "noscript", "template", "svg", "iframe", "object"];

/// Elements that start and end a block.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "br", "caption", "dd", "details", "div",
    "dl", "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5",
    "h6", "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "summary", "table",
    "tr", "ul",
];

/// Elements followed by a space so adjacent cells do not run together.
const SPACED_ELEMENTS: &[&str] = &["td", "th"];

/// Strip tags, scripts and styles; collapse whitespace; keep block-level
/// boundaries as separate blocks.
pub(super) fn normalize_html(source: &str, cancel: &CancellationToken) -> Result<NormalizedText> {
    let document = Html::parse_document(source);
    let mut walker = HtmlWalker::default();

    if let Some(title) = document_title(&document) {
        walker.output.metadata.insert("title".to_string(), title);
    }

    walker.walk(document.root_element(), cancel)?;
    walker.flush(cancel)?;

    Ok(walker.output)
}

/// Plain text of an HTML fragment, one entry per block-level element.
pub(super) fn fragment_blocks(fragment: &str, cancel: &CancellationToken) -> Result<Vec<String>> {
    let fragment = Html::parse_fragment(fragment);
    let mut walker = HtmlWalker::default();
    walker.walk(fragment.root_element(), cancel)?;
    walker.flush(cancel)?;
    Ok(walker.output.blocks.into_iter().map(|block| block.text).collect())
}

fn document_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let title = document.select(&selector).next()?;
    let text = collapse_whitespace(&title.text().collect::<String>());
    (!text.is_empty()).then_some(text)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Default)]
struct HtmlWalker {
    buf: String,
    ordinal: usize,
    output: NormalizedText,
}

impl HtmlWalker {
    fn walk(&mut self, element: ElementRef<'_>, cancel: &CancellationToken) -> Result<()> {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.buf.push_str(text),
                Node::Element(el) => {
                    let name = el.name();
                    if SKIPPED_ELEMENTS.contains(&name) {
                        continue;
                    }
                    let is_block = BLOCK_ELEMENTS.contains(&name);
                    if is_block {
                        self.flush(cancel)?;
                    }
                    if let Some(child_element) = ElementRef::wrap(child) {
                        self.walk(child_element, cancel)?;
                    }
                    if is_block {
                        self.flush(cancel)?;
                    } else if SPACED_ELEMENTS.contains(&name) {
                        self.buf.push(' ');
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn flush(&mut self, cancel: &CancellationToken) -> Result<()> {
        check_cancelled(cancel)?;
        let text = collapse_whitespace(&std::mem::take(&mut self.buf));
        if !text.is_empty() {
            self.output.push_block(text, PositionHint::Block { ordinal: self.ordinal });
            self.ordinal += 1;
        }
        Ok(())
    }
}

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use tokio_util::sync::CancellationToken;

use super::html::fragment_blocks;
use super::{NormalizedText, PositionHint, check_cancelled};
use crate::error::Result;

/// Strip markdown formatting, keeping one block per paragraph, list item,
/// code block or table row, each tagged with its heading path.
///
/// Raw HTML blocks keep their text, split the same way an HTML document
/// is. Inline tags are dropped and the text between them stays in place.
pub(super) fn normalize_markdown(source: &str, cancel: &CancellationToken) -> Result<NormalizedText> {
    let mut walker = MarkdownWalker::default();
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS;

    for event in Parser::new_ext(source, options) {
        match event {
            Event::Start(Tag::Heading { .. }) => walker.flush(cancel)?,
            Event::End(TagEnd::Heading(level)) => walker.close_heading(level as usize, cancel)?,
            Event::Start(
                Tag::List(_) | Tag::Item | Tag::CodeBlock(_) | Tag::Table(_) | Tag::HtmlBlock,
            ) => walker.flush(cancel)?,
            Event::Html(raw) => walker.html.push_str(&raw),
            Event::End(TagEnd::HtmlBlock) => walker.flush_html(cancel)?,
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Item
                | TagEnd::CodeBlock
                | TagEnd::TableHead
                | TagEnd::TableRow
                | TagEnd::FootnoteDefinition,
            ) => walker.flush(cancel)?,
            Event::End(TagEnd::TableCell) => walker.buf.push(' '),
            Event::Text(text) | Event::Code(text) => walker.buf.push_str(&text),
            Event::SoftBreak => walker.buf.push(' '),
            Event::HardBreak => walker.buf.push('\n'),
            Event::Rule => walker.flush(cancel)?,
            _ => {}
        }
    }
    walker.flush(cancel)?;

    Ok(walker.output)
}

#[derive(Default)]
struct MarkdownWalker {
    headings: Vec<String>,
    buf: String,
    html: String,
    output: NormalizedText,
}

impl MarkdownWalker {
    fn heading_path(&self) -> String {
        self.headings.join(" > ")
    }

    fn flush(&mut self, cancel: &CancellationToken) -> Result<()> {
        check_cancelled(cancel)?;
        let text = std::mem::take(&mut self.buf);
        let hint = PositionHint::Section { heading_path: self.heading_path() };
        self.output.push_block(text, hint);
        Ok(())
    }

    fn flush_html(&mut self, cancel: &CancellationToken) -> Result<()> {
        let raw = std::mem::take(&mut self.html);
        for text in fragment_blocks(&raw, cancel)? {
            let hint = PositionHint::Section { heading_path: self.heading_path() };
            self.output.push_block(text, hint);
        }
        Ok(())
    }

    fn close_heading(&mut self, level: usize, cancel: &CancellationToken) -> Result<()> {
        check_cancelled(cancel)?;
        let heading = std::mem::take(&mut self.buf).trim().to_string();
        if heading.is_empty() {
            return Ok(());
        }
        if level == 1 && !self.output.metadata.contains_key("title") {
            self.output.metadata.insert("title".to_string(), heading.clone());
        }
        // A skipped level (# then ###) still nests under the last heading.
        self.headings.truncate(level.saturating_sub(1));
        self.headings.push(heading.clone());
        let hint = PositionHint::Section { heading_path: self.heading_path() };
        self.output.push_block(heading, hint);
        Ok(())
    }
}

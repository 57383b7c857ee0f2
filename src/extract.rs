//! Multi-format text extraction (plain text, PDF, EPUB).
//!
//! Turns a [`RawDocument`] into normalized UTF-8 text. Extraction is
//! format-specific; everything downstream of this module only sees a string.
//!
//! Known limitations: PDF column layout is not reconstructed, EPUB entries
//! are read in lexicographic name order rather than spine order, and entry
//! extensions are matched case-sensitively.

use scraper::{ElementRef, Html, Node, Selector};
use thiserror::Error;

use crate::archive::{ArchiveIndex, ZipIndex};
use crate::models::{DocumentFormat, RawDocument};

/// Markup entry extensions read from an EPUB container.
const MARKUP_EXTENSIONS: [&str; 3] = [".xhtml", ".html", ".htm"];

/// Elements whose text is never visible.
const SKIPPED_ELEMENTS: [&str; 5] = ["script", "style", "noscript", "template", "head"];

/// Elements that start and end on their own line.
const BLOCK_ELEMENTS: [&str; 29] = [
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main",
    "nav", "ol", "p", "pre", "section", "table", "tr", "ul",
];

/// Extraction failure, scoped to a single upload.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("corrupt document: {0}")]
    CorruptDocument(String),
    #[error("document too large: {size} bytes (limit {limit})")]
    TooLarge { size: usize, limit: usize },
}

/// Extracts text from a raw document according to its declared format.
pub fn extract_text(document: &RawDocument) -> Result<String, ExtractError> {
    match document.format {
        DocumentFormat::PlainText => extract_plain(&document.bytes),
        DocumentFormat::Pdf => extract_pdf(&document.bytes),
        DocumentFormat::EpubArchive => extract_epub(&document.bytes),
    }
}

fn extract_plain(bytes: &[u8]) -> Result<String, ExtractError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| ExtractError::CorruptDocument(format!("invalid UTF-8: {}", e)))
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::CorruptDocument(format!("PDF: {}", e)))?;
    Ok(pages
        .iter()
        .map(|page| join_fragments(page))
        .collect::<Vec<_>>()
        .join("\n\n"))
}

/// Joins the text runs of one page with single spaces.
fn join_fragments(page: &str) -> String {
    page.lines()
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_epub(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut index = ZipIndex::open(bytes)?;
    extract_markup_entries(&mut index)
}

/// Extracts the body text of every markup entry, in ascending name order.
pub fn extract_markup_entries(index: &mut dyn ArchiveIndex) -> Result<String, ExtractError> {
    let mut names: Vec<String> = index
        .entry_names()
        .into_iter()
        .filter(|name| is_markup_entry(name))
        .collect();
    names.sort();

    let mut texts = Vec::with_capacity(names.len());
    for name in &names {
        let raw = index.read_entry(name)?;
        texts.push(markup_body_text(&String::from_utf8_lossy(&raw)));
    }
    Ok(texts.join("\n\n"))
}

/// Extension match is case-sensitive: `ch1.XHTML` is not read.
fn is_markup_entry(name: &str) -> bool {
    MARKUP_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Visible text of the document body, one line per block element.
pub fn markup_body_text(markup: &str) -> String {
    let document = Html::parse_document(markup);
    let body = match Selector::parse("body") {
        Ok(sel) => document.select(&sel).next(),
        Err(_) => None,
    };
    let Some(body) = body else {
        return String::new();
    };

    let mut out = String::new();
    collect_visible_text(body, &mut out);

    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_visible_text(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if SKIPPED_ELEMENTS.contains(&name) {
        return;
    }
    if name == "br" {
        out.push('\n');
        return;
    }
    let block = BLOCK_ELEMENTS.contains(&name);
    if block {
        out.push('\n');
    }
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            collect_visible_text(child_element, out);
        } else if let Node::Text(text) = child.value() {
            push_collapsed(out, text);
        }
    }
    if block {
        out.push('\n');
    }
}

/// Appends text with whitespace runs collapsed to single spaces.
fn push_collapsed(out: &mut String, text: &str) {
    let mut words = text.split_whitespace().peekable();
    if words.peek().is_none() {
        if !text.is_empty() && !out.ends_with([' ', '\n']) && !out.is_empty() {
            out.push(' ');
        }
        return;
    }
    if text.starts_with(char::is_whitespace) && !out.ends_with([' ', '\n']) && !out.is_empty() {
        out.push(' ');
    }
    let joined = words.collect::<Vec<_>>().join(" ");
    out.push_str(&joined);
    if text.ends_with(char::is_whitespace) {
        out.push(' ');
    }
}

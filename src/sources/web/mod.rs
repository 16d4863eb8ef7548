pub mod browser;


use fancy_regex::Regex;
use scraper::{Html, Node};
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

use super::TextSegment;
use crate::embeddings::chunking::ChunkMetadata;
use crate::{DocuError, Result};

/// Elements whose text never reaches the index
const SKIPPED_ELEMENTS: [&str; 5] = ["script", "style", "noscript", "template", "svg"];

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("regex is valid"));

/// Parse a user supplied URL, accepting only `http://` and `https://`
#[inline]
pub fn parse_web_url(input: &str) -> Result<Url> {
    let trimmed = input.trim();
    let lower = trimmed.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return Err(DocuError::Validation(format!(
            "URL must start with http:// or https://: {trimmed}"
        )));
    }

    Url::parse(trimmed).map_err(|e| DocuError::Validation(format!("Invalid URL {trimmed}: {e}")))
}

/// Visible text of a rendered page, one line per text node with inner whitespace
/// collapsed, blank lines dropped
#[inline]
pub fn extract_page_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut lines = Vec::new();

    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|element| SKIPPED_ELEMENTS.contains(&element.name()))
        });
        if hidden {
            continue;
        }

        let line = text.trim();
        if !line.is_empty() {
            lines.push(WHITESPACE.replace_all(line, " ").into_owned());
        }
    }

    lines.join("\n")
}

/// Collapse a rendered page into a single segment tagged with its URL
#[inline]
pub fn web_segment(url: &Url, html: &str) -> Option<TextSegment> {
    let text = extract_page_text(html);
    debug!("Extracted {} characters of text from {}", text.len(), url);

    if text.trim().is_empty() {
        return None;
    }

    Some(TextSegment::new(text, ChunkMetadata::web(url.as_str())))
}

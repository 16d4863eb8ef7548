#[cfg(test)]
mod tests;

use anyhow::{Context, Result, bail};
use lopdf::Document;
use std::path::Path;
use tracing::{debug, warn};

use super::{TextSegment, doc_name};
use crate::embeddings::chunking::ChunkMetadata;

/// Extract a PDF page by page, one segment per page with its 1-based number.
/// Pages without text are skipped.
#[inline]
pub fn extract_pdf(path: &Path) -> Result<Vec<TextSegment>> {
    let document =
        Document::load(path).with_context(|| format!("Failed to load PDF {}", path.display()))?;

    if document.is_encrypted() {
        bail!("PDF is encrypted: {}", path.display());
    }

    let name = doc_name(path);
    let pages = document.get_pages();
    let mut segments = Vec::with_capacity(pages.len());

    for page_number in pages.keys().copied() {
        let text = match document.extract_text(&[page_number]) {
            Ok(text) => text,
            Err(e) => {
                warn!("Could not extract text from {} page {}: {}", name, page_number, e);
                continue;
            }
        };

        if text.trim().is_empty() {
            debug!("Skipping empty page {} of {}", page_number, name);
            continue;
        }

        segments.push(TextSegment::new(
            text,
            ChunkMetadata::document(name.clone(), Some(page_number)),
        ));
    }

    debug!(
        "Read {} of {} pages from {}",
        segments.len(),
        pages.len(),
        name
    );
    Ok(segments)
}

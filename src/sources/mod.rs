// Source extraction module
// Turns Word documents, PDF documents and rendered web pages into text segments

pub mod docx;
pub mod pdf;
pub mod store;
pub mod web;


use std::path::Path;
use tracing::debug;

use crate::embeddings::chunking::ChunkMetadata;
use crate::{DocuError, Result};

pub use store::{DocumentKind, DocumentStore};

/// A span of extracted text with its provenance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl TextSegment {
    #[inline]
    pub fn new(text: impl Into<String>, metadata: ChunkMetadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }
}

/// Basename of a path as used in `doc_name`
#[inline]
pub fn doc_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Extract every segment from a stored document, picking the extractor by extension
#[inline]
pub fn extract_document(path: &Path) -> Result<Vec<TextSegment>> {
    let kind = DocumentKind::from_path(path).ok_or_else(|| {
        DocuError::Validation(format!("Unsupported document type: {}", path.display()))
    })?;

    let segments = match kind {
        DocumentKind::Word => docx::extract_docx(path),
        DocumentKind::Pdf => pdf::extract_pdf(path),
    }
    .map_err(|e| DocuError::Extraction(format!("{}: {e:#}", path.display())))?;

    debug!(
        "Extracted {} segments from {}",
        segments.len(),
        path.display()
    );
    Ok(segments)
}

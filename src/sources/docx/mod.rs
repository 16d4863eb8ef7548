
use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

use super::{TextSegment, doc_name};
use crate::embeddings::chunking::ChunkMetadata;

const DOCUMENT_PART: &str = "word/document.xml";

/// Extract a `.docx` file as one segment per document section.
/// Word documents carry no page numbers.
#[inline]
pub fn extract_docx(path: &Path) -> Result<Vec<TextSegment>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("Not a valid Word archive: {}", path.display()))?;

    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_PART)
        .with_context(|| format!("Missing {DOCUMENT_PART} in {}", path.display()))?
        .read_to_string(&mut xml)
        .with_context(|| format!("Failed to read {DOCUMENT_PART}"))?;

    let name = doc_name(path);
    let segments: Vec<TextSegment> = document_sections(&xml)?
        .into_iter()
        .filter(|section| !section.trim().is_empty())
        .map(|section| TextSegment::new(section, ChunkMetadata::document(name.clone(), None)))
        .collect();

    debug!("Read {} sections from {}", segments.len(), name);
    Ok(segments)
}

/// Split the body of `word/document.xml` into plain-text sections.
/// A section ends with the paragraph carrying its `w:sectPr`.
pub(crate) fn document_sections(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut sections = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut section_break = false;

    loop {
        match reader
            .read_event()
            .context("Malformed XML in Word document")?
        {
            Event::Start(e) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"sectPr" => section_break = true,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                b"sectPr" => section_break = true,
                _ => {}
            },
            Event::Text(e) if in_text => {
                let text = e.unescape().context("Invalid text in Word document")?;
                current.push_str(&text);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    current.push_str("\n\n");
                    if section_break {
                        sections.push(std::mem::take(&mut current));
                        section_break = false;
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !current.trim().is_empty() {
        sections.push(current);
    }

    Ok(sections)
}

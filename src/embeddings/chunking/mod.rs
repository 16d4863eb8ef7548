
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::sources::TextSegment;

/// Separators tried in order: paragraph, line, word, then single characters
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Provenance carried by every chunk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Basename of the source file, absent for web pages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_name: Option<String>,
    /// 1-based page number, absent when the format has no pagination
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// URL of the web page this chunk came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ChunkMetadata {
    #[inline]
    pub fn document(doc_name: impl Into<String>, page: Option<u32>) -> Self {
        Self {
            doc_name: Some(doc_name.into()),
            page,
            source: None,
        }
    }

    #[inline]
    pub fn web(url: impl Into<String>) -> Self {
        Self {
            doc_name: None,
            page: None,
            source: Some(url.into()),
        }
    }

    /// Page number, or `N/A` for formats without pagination
    #[inline]
    pub fn page_label(&self) -> String {
        self.page
            .map_or_else(|| "N/A".to_string(), |page| page.to_string())
    }

    /// Document name, falling back to the URL and then to `Unknown`
    #[inline]
    pub fn display_name(&self) -> &str {
        self.doc_name
            .as_deref()
            .or(self.source.as_deref())
            .unwrap_or("Unknown")
    }

    /// Human readable tag prefixed to chunk content
    #[inline]
    pub fn citation_tag(&self) -> String {
        match (&self.doc_name, &self.source) {
            (None, Some(url)) => format!("[{url}]"),
            _ => format!("[{} - page {}]", self.display_name(), self.page_label()),
        }
    }
}

/// A unit of indexed text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    #[inline]
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// First `max_chars` characters of the content followed by `...`
    #[inline]
    pub fn preview(&self, max_chars: usize) -> String {
        let head: String = self.content.chars().take(max_chars).collect();
        format!("{}...", head.replace('\n', " "))
    }
}

/// Configuration for content chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum window size in characters
    pub chunk_size: usize,
    /// Characters shared between adjacent windows
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Split `text` into tagged chunks carrying `metadata`
#[inline]
pub fn chunk(text: &str, metadata: &ChunkMetadata, config: &ChunkingConfig) -> Vec<Chunk> {
    let tag = metadata.citation_tag();

    split_text(text, config)
        .into_iter()
        .filter(|piece| !piece.trim().is_empty())
        .map(|piece| Chunk {
            content: format!("{tag}\n{piece}"),
            metadata: metadata.clone(),
        })
        .collect()
}

/// Chunk every extracted segment, preserving segment order
#[inline]
pub fn chunk_segments(segments: &[TextSegment], config: &ChunkingConfig) -> Vec<Chunk> {
    let chunks: Vec<Chunk> = segments
        .iter()
        .flat_map(|segment| chunk(&segment.text, &segment.metadata, config))
        .collect();

    debug!(
        "Chunked {} segments into {} chunks (avg {} chars)",
        segments.len(),
        chunks.len(),
        chunks.iter().map(|c| char_len(&c.content)).sum::<usize>() / chunks.len().max(1)
    );

    chunks
}

/// Split text into overlapping windows of at most `chunk_size` characters,
/// preferring paragraph, then line, then word boundaries
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    split_recursive(text, &SEPARATORS, config)
}

fn split_recursive(text: &str, separators: &[&str], config: &ChunkingConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    let (separator, finer_separators) = pick_separator(text, separators);

    let mut pending: Vec<&str> = Vec::new();
    for split in split_keeping_separator(text, separator) {
        if char_len(split) < config.chunk_size {
            pending.push(split);
            continue;
        }

        if !pending.is_empty() {
            chunks.extend(merge_splits(&pending, config));
            pending.clear();
        }

        if finer_separators.is_empty() {
            chunks.push(split.to_string());
        } else {
            chunks.extend(split_recursive(split, finer_separators, config));
        }
    }

    if !pending.is_empty() {
        chunks.extend(merge_splits(&pending, config));
    }

    chunks
}

/// First separator present in the text, along with the finer ones after it
fn pick_separator<'s>(text: &str, separators: &'s [&'s str]) -> (&'s str, &'s [&'s str]) {
    for (i, &separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            return ("", &[]);
        }
        if text.contains(separator) {
            return (separator, separators.get(i + 1..).unwrap_or_default());
        }
    }
    ("", &[])
}

/// Split on `separator`, attaching each separator to the start of the piece after it.
/// An empty separator yields single characters.
fn split_keeping_separator<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
    let mut pieces = Vec::new();
    let mut start = 0;

    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            if let Some(piece) = text.get(start..idx) {
                pieces.push(piece);
            }
            start = idx;
        }
    }

    if let Some(rest) = text.get(start..) {
        if !rest.is_empty() {
            pieces.push(rest);
        }
    }

    pieces
}

/// Greedily pack splits into windows, carrying up to `chunk_overlap`
/// trailing characters into the next window
fn merge_splits(splits: &[&str], config: &ChunkingConfig) -> Vec<String> {
    let mut windows = Vec::new();
    let mut current: VecDeque<&str> = VecDeque::new();
    let mut total = 0;

    for split in splits {
        let len = char_len(split);

        if total + len > config.chunk_size {
            if total > config.chunk_size {
                warn!(
                    "Created a chunk of size {}, which is longer than the specified {}",
                    total, config.chunk_size
                );
            }

            if !current.is_empty() {
                if let Some(window) = join_window(&current) {
                    windows.push(window);
                }

                while total > config.chunk_overlap || (total + len > config.chunk_size && total > 0)
                {
                    match current.pop_front() {
                        Some(first) => total -= char_len(first),
                        None => break,
                    }
                }
            }
        }

        current.push_back(split);
        total += len;
    }

    if let Some(window) = join_window(&current) {
        windows.push(window);
    }

    windows
}

fn join_window(splits: &VecDeque<&str>) -> Option<String> {
    let joined: String = splits.iter().copied().collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[inline]
fn char_len(text: &str) -> usize {
    text.chars().count()
}

// Indexer module
// Owns the cached vector index and keeps it in step with the document store and the URL registry


use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::Config;
use crate::embeddings::Embedder;
use crate::embeddings::chunking::{Chunk, ChunkingConfig, chunk_segments};
use crate::index::VectorIndex;
use crate::registry::Registry;
use crate::sources::web::browser::{PageRenderer, RenderedPage};
use crate::sources::web::{parse_web_url, web_segment};
use crate::sources::{DocumentStore, extract_document};
use crate::{DocuError, Result};

/// Result of asking for a web page to be indexed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddPageOutcome {
    /// The page was indexed and registered
    Added { url: String, chunks: usize },
    /// The URL is already in the registry; nothing changed
    AlreadyRegistered(String),
}

/// Statistics about a full rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReindexStats {
    pub documents_indexed: usize,
    pub documents_failed: usize,
    pub pages_indexed: usize,
    /// URL and reason for every web page that could not be re-rendered
    pub pages_failed: Vec<(String, String)>,
    pub chunks_created: usize,
}

/// Lazily acquired vector index with explicit invalidation
#[derive(Debug)]
pub struct IndexCache {
    index_path: PathBuf,
    store: DocumentStore,
    chunking: ChunkingConfig,
    cached: Option<VectorIndex>,
}

impl IndexCache {
    #[inline]
    pub fn new(index_path: impl Into<PathBuf>, store: DocumentStore, chunking: ChunkingConfig) -> Self {
        Self {
            index_path: index_path.into(),
            store,
            chunking,
            cached: None,
        }
    }

    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.index_path(),
            DocumentStore::new(config.documents_dir()),
            config.chunking.clone(),
        )
    }

    #[inline]
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    #[inline]
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    #[inline]
    pub fn is_cached(&self) -> bool {
        self.cached.is_some()
    }

    /// Drop the in-memory index so the next access reads the disk again
    #[inline]
    pub fn invalidate(&mut self) {
        if self.cached.take().is_some() {
            debug!("Invalidated cached index");
        }
    }

    /// The current index, loading it from disk or building it from every stored
    /// document on first access. `None` when there is nothing to index.
    #[inline]
    pub fn get(&mut self, embedder: &dyn Embedder) -> Result<Option<&VectorIndex>> {
        if self.cached.is_none() {
            self.cached = self.acquire(embedder)?;
        }
        Ok(self.cached.as_ref())
    }

    /// Number of indexed chunks, `None` when no index exists
    #[inline]
    pub fn total_chunks(&mut self, embedder: &dyn Embedder) -> Result<Option<usize>> {
        Ok(self.get(embedder)?.map(VectorIndex::len))
    }

    fn acquire(&self, embedder: &dyn Embedder) -> Result<Option<VectorIndex>> {
        if let Some(index) = VectorIndex::load(&self.index_path)? {
            return Ok(Some(index));
        }

        let chunks = self.load_all_chunks()?;
        if chunks.is_empty() {
            debug!("No documents to index");
            return Ok(None);
        }

        info!("Building index from {} document chunks", chunks.len());
        let index = VectorIndex::create(embedder, chunks)?;
        index.persist(&self.index_path)?;
        Ok(Some(index))
    }

    /// Chunks of every valid stored document, Word first then PDF.
    /// A document that fails to extract is logged and skipped.
    #[inline]
    pub fn load_all_chunks(&self) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        for path in self.store.get_all_doc_paths()? {
            match self.document_chunks(&path) {
                Ok(document_chunks) => chunks.extend(document_chunks),
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }
        Ok(chunks)
    }

    fn document_chunks(&self, path: &Path) -> Result<Vec<Chunk>> {
        let segments = extract_document(path)?;
        Ok(chunk_segments(&segments, &self.chunking))
    }

    /// Render, chunk and index one web page, registering it once the index is saved
    #[inline]
    pub fn add_web_page(
        &mut self,
        embedder: &dyn Embedder,
        renderer: &dyn PageRenderer,
        registry: &mut Registry,
        input: &str,
    ) -> Result<AddPageOutcome> {
        let url = match new_web_url(registry, input)? {
            NewUrl::Fresh(url) => url,
            NewUrl::Known(known) => return Ok(AddPageOutcome::AlreadyRegistered(known)),
        };

        info!("Loading web page {}", url);
        let page = renderer
            .open(&url)
            .map_err(|e| DocuError::Extraction(format!("Could not load page: {e}")))?;

        self.index_rendered_page(embedder, registry, page)
    }

    /// Index a page that is already open. The page, and with it the browser,
    /// is released before any embedding work starts.
    #[inline]
    pub fn index_rendered_page(
        &mut self,
        embedder: &dyn Embedder,
        registry: &mut Registry,
        page: Box<dyn RenderedPage>,
    ) -> Result<AddPageOutcome> {
        let url = page.url().clone();
        if registry.contains(url.as_str()) {
            return Ok(AddPageOutcome::AlreadyRegistered(url.to_string()));
        }

        let chunks = page_chunks(page.as_ref(), &self.chunking);
        drop(page);
        let chunks = chunks?;

        let added = self.append_chunks(embedder, chunks)?;
        registry.register(url.as_str())?;

        info!("Indexed {} chunks from {}", added, url);
        Ok(AddPageOutcome::Added {
            url: url.to_string(),
            chunks: added,
        })
    }

    /// Append to the current index, creating it if needed, and persist.
    /// A failed persist leaves the cache invalidated so the disk stays authoritative.
    fn append_chunks(&mut self, embedder: &dyn Embedder, chunks: Vec<Chunk>) -> Result<usize> {
        let current = match self.cached.take() {
            Some(index) => Some(index),
            None => self.acquire(embedder)?,
        };

        let added = chunks.len();
        let index = match current {
            Some(mut index) => {
                if let Err(e) = index.append(embedder, chunks) {
                    self.cached = Some(index);
                    return Err(e);
                }
                index
            }
            None => VectorIndex::create(embedder, chunks)?,
        };

        index.persist(&self.index_path)?;
        self.cached = Some(index);
        Ok(added)
    }

    /// Rebuild the index from every stored document and every registered web page.
    /// Pages that can no longer be rendered are dropped from the registry.
    #[inline]
    pub fn reindex(
        &mut self,
        embedder: &dyn Embedder,
        renderer: &dyn PageRenderer,
        registry: &mut Registry,
    ) -> Result<ReindexStats> {
        self.invalidate();

        let paths = self.store.get_all_doc_paths()?;
        let urls = registry.urls().to_vec();
        let mut stats = ReindexStats::default();
        let mut chunks = Vec::new();

        let bar = progress_bar((paths.len() + urls.len()) as u64);

        for path in &paths {
            bar.set_message(crate::sources::doc_name(path));
            match self.document_chunks(path) {
                Ok(document_chunks) => {
                    stats.documents_indexed += 1;
                    chunks.extend(document_chunks);
                }
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    stats.documents_failed += 1;
                }
            }
            bar.inc(1);
        }

        let mut kept_urls = Vec::with_capacity(urls.len());
        for url in urls {
            bar.set_message(url.clone());
            match self.render_registered(renderer, &url) {
                Ok(page_chunks) => {
                    stats.pages_indexed += 1;
                    chunks.extend(page_chunks);
                    kept_urls.push(url);
                }
                Err(e) => {
                    error!("Failed to re-index {}: {}", url, e);
                    stats.pages_failed.push((url, e.to_string()));
                }
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        stats.chunks_created = chunks.len();

        let rebuilt = if chunks.is_empty() {
            None
        } else {
            Some(VectorIndex::create(embedder, chunks)?)
        };

        // Shrink the registry before the index so it never lists a page the index lacks
        registry.replace(kept_urls)?;

        match rebuilt {
            Some(index) => {
                index.persist(&self.index_path)?;
                self.cached = Some(index);
            }
            None => VectorIndex::destroy(&self.index_path)?,
        }

        info!(
            "Re-indexed {} documents and {} web pages into {} chunks ({} documents and {} pages failed)",
            stats.documents_indexed,
            stats.pages_indexed,
            stats.chunks_created,
            stats.documents_failed,
            stats.pages_failed.len()
        );
        Ok(stats)
    }

    fn render_registered(&self, renderer: &dyn PageRenderer, url: &str) -> Result<Vec<Chunk>> {
        let url = parse_web_url(url)?;
        let page = renderer
            .open(&url)
            .map_err(|e| DocuError::Extraction(format!("Could not load page: {e}")))?;
        page_chunks(page.as_ref(), &self.chunking)
    }
}

/// Whether a user supplied URL still needs indexing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewUrl {
    Fresh(Url),
    Known(String),
}

/// Validate a URL and check it against the registry
#[inline]
pub fn new_web_url(registry: &Registry, input: &str) -> Result<NewUrl> {
    let url = parse_web_url(input)?;
    let trimmed = input.trim();

    if registry.contains(url.as_str()) || registry.contains(trimmed) {
        info!("{} is already indexed", url);
        return Ok(NewUrl::Known(url.to_string()));
    }
    Ok(NewUrl::Fresh(url))
}

fn page_chunks(page: &dyn RenderedPage, chunking: &ChunkingConfig) -> Result<Vec<Chunk>> {
    let html = page
        .html()
        .map_err(|e| DocuError::Extraction(format!("Could not read page: {e}")))?;

    let segment = web_segment(page.url(), &html).ok_or_else(|| {
        DocuError::Extraction(format!("No text extracted from {}", page.url()))
    })?;

    let chunks = chunk_segments(std::slice::from_ref(&segment), chunking);
    if chunks.is_empty() {
        return Err(DocuError::Extraction(format!(
            "No text extracted from {}",
            page.url()
        )));
    }
    Ok(chunks)
}

fn progress_bar(len: u64) -> ProgressBar {
    let bar = if console::user_attended_stderr() {
        ProgressBar::new(len).with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] Indexing {msg}")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    };
    bar.set_position(0);
    bar
}

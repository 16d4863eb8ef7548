// Session state
// Chat history, the pending web page and the re-index reminder for one run of the tool


use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

use crate::answering::{AnswerOutcome, AnsweringPipeline, Conversation};
use crate::config::Config;
use crate::embeddings::Embedder;
use crate::indexer::{AddPageOutcome, IndexCache, NewUrl, ReindexStats, new_web_url};
use crate::registry::Registry;
use crate::sources::doc_name;
use crate::sources::web::browser::{PageRenderer, RenderedPage};
use crate::{DocuError, Result};

/// What the "Documents" view shows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentListing {
    pub word: Vec<String>,
    pub pdf: Vec<String>,
    pub web: Vec<String>,
    pub total_chunks: Option<usize>,
}

impl DocumentListing {
    #[inline]
    pub fn total_chunks_label(&self) -> String {
        match self.total_chunks {
            Some(total) => total.to_string(),
            None => "0 (No documents indexed yet)".to_string(),
        }
    }
}

pub struct Session {
    cache: IndexCache,
    registry: Registry,
    conversation: Conversation,
    pending: Option<Box<dyn RenderedPage>>,
    needs_reindex: bool,
}

impl Session {
    #[inline]
    pub fn new(cache: IndexCache, registry: Registry) -> Self {
        Self {
            cache,
            registry,
            conversation: Conversation::new(),
            pending: None,
            needs_reindex: false,
        }
    }

    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            IndexCache::from_config(config),
            Registry::load(config.registry_path()),
        )
    }

    #[inline]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[inline]
    pub fn cache(&self) -> &IndexCache {
        &self.cache
    }

    /// Set after a document or URL is added or removed outside the incremental flow
    #[inline]
    pub fn needs_reindex(&self) -> bool {
        self.needs_reindex
    }

    /// Answer a question against the current index and record it in the history
    #[inline]
    pub fn ask(&mut self, pipeline: &AnsweringPipeline<'_>, question: &str) -> Result<AnswerOutcome> {
        let index = self.cache.get(pipeline.embedder())?;
        pipeline.ask(index, &mut self.conversation, question)
    }

    /// Render a page and hold it until it is finalized or cleaned up.
    /// Any page that was already pending is released first.
    #[inline]
    pub fn open_web_page(&mut self, renderer: &dyn PageRenderer, input: &str) -> Result<NewUrl> {
        self.cleanup();

        let url = match new_web_url(&self.registry, input)? {
            NewUrl::Fresh(url) => url,
            known @ NewUrl::Known(_) => return Ok(known),
        };

        let page = renderer
            .open(&url)
            .map_err(|e| DocuError::Extraction(format!("Could not load page: {e}")))?;
        debug!("Holding rendered page {}", url);
        self.pending = Some(page);
        Ok(NewUrl::Fresh(url))
    }

    #[inline]
    pub fn pending_url(&self) -> Option<&Url> {
        self.pending.as_ref().map(|page| page.url())
    }

    /// Index the pending page. The browser is released whatever the outcome.
    #[inline]
    pub fn finalize_web_page(&mut self, embedder: &dyn Embedder) -> Result<AddPageOutcome> {
        let page = self
            .pending
            .take()
            .ok_or_else(|| DocuError::Validation("No web page is open".to_string()))?;
        self.cache
            .index_rendered_page(embedder, &mut self.registry, page)
    }

    /// Open, index and register a page in one step
    #[inline]
    pub fn add_web_page(
        &mut self,
        embedder: &dyn Embedder,
        renderer: &dyn PageRenderer,
        input: &str,
    ) -> Result<AddPageOutcome> {
        self.cleanup();
        self.cache
            .add_web_page(embedder, renderer, &mut self.registry, input)
    }

    /// Release any pending page and its browser. Returns whether one was open.
    #[inline]
    pub fn cleanup(&mut self) -> bool {
        self.pending.take().is_some_and(|page| {
            debug!("Releasing pending page {}", page.url());
            true
        })
    }

    /// Copy a document into the store; it is searchable after the next re-index
    #[inline]
    pub fn add_document(&mut self, source: &Path) -> Result<PathBuf> {
        let stored = self.cache.store().add(source)?;
        self.needs_reindex = true;
        info!("Added {}; re-index required", doc_name(&stored));
        Ok(stored)
    }

    #[inline]
    pub fn remove_document(&mut self, name: &str) -> Result<PathBuf> {
        let removed = self.cache.store().remove(name)?;
        self.needs_reindex = true;
        info!("Removed {}; re-index required", name);
        Ok(removed)
    }

    /// Returns `false` when the URL was not registered
    #[inline]
    pub fn remove_url(&mut self, url: &str) -> Result<bool> {
        let removed = self.registry.remove(url.trim())?;
        if removed {
            self.needs_reindex = true;
            info!("Removed {}; re-index required", url.trim());
        }
        Ok(removed)
    }

    #[inline]
    pub fn reindex(
        &mut self,
        embedder: &dyn Embedder,
        renderer: &dyn PageRenderer,
    ) -> Result<ReindexStats> {
        self.cleanup();
        let stats = self.cache.reindex(embedder, renderer, &mut self.registry)?;
        self.needs_reindex = false;
        Ok(stats)
    }

    /// Word and PDF documents, registered pages and the indexed chunk count.
    /// Builds the index on first use, like any other index access.
    #[inline]
    pub fn listing(&mut self, embedder: &dyn Embedder) -> Result<DocumentListing> {
        let (word, pdf) = self.cache.store().get_doc_paths()?;
        let total_chunks = self.cache.total_chunks(embedder)?;

        Ok(DocumentListing {
            word: word.iter().map(|path| doc_name(path)).collect(),
            pdf: pdf.iter().map(|path| doc_name(path)).collect(),
            web: self.registry.urls().to_vec(),
            total_chunks,
        })
    }
}

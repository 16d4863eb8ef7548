// Known-sources registry
// Ordered set of indexed web URLs, stored as a JSON array and rewritten wholesale


use anyhow::Context;
use itertools::Itertools;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{DocuError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    path: PathBuf,
    urls: Vec<String>,
}

impl Registry {
    /// Read the registry. A missing or unreadable file yields an empty registry.
    #[inline]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let urls = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Vec<String>>(&content) {
                Ok(urls) => dedup_in_order(urls),
                Err(e) => {
                    warn!(
                        "Ignoring unreadable URL registry {}: {}",
                        path.display(),
                        e
                    );
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!("Could not read URL registry {}: {}", path.display(), e);
                Vec::new()
            }
        };

        debug!("Loaded {} registered URLs from {}", urls.len(), path.display());
        Self { path, urls }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    #[inline]
    pub fn contains(&self, url: &str) -> bool {
        self.urls.iter().any(|known| known == url)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Append a URL and save. Returns `false` without writing if it is already known.
    #[inline]
    pub fn register(&mut self, url: &str) -> Result<bool> {
        if self.contains(url) {
            return Ok(false);
        }

        self.urls.push(url.to_string());
        if let Err(e) = self.save() {
            self.urls.pop();
            return Err(e);
        }
        Ok(true)
    }

    /// Remove a URL and save. Returns `false` if it was not registered.
    #[inline]
    pub fn remove(&mut self, url: &str) -> Result<bool> {
        let Some(position) = self.urls.iter().position(|known| known == url) else {
            return Ok(false);
        };

        let removed = self.urls.remove(position);
        if let Err(e) = self.save() {
            self.urls.insert(position, removed);
            return Err(e);
        }
        Ok(true)
    }

    /// Replace the whole list and save
    #[inline]
    pub fn replace(&mut self, urls: Vec<String>) -> Result<()> {
        let previous = std::mem::replace(&mut self.urls, dedup_in_order(urls));
        if let Err(e) = self.save() {
            self.urls = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Write the list through a temporary sibling file and rename it into place
    #[inline]
    pub fn save(&self) -> Result<()> {
        self.write_atomically().map_err(|e| {
            DocuError::Indexing(format!("Failed to save URL registry: {e:#}"))
        })
    }

    fn write_atomically(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = self
            .path
            .with_file_name(format!(".{file_name}.tmp-{}", Uuid::new_v4().simple()));

        let content = serde_json::to_string_pretty(&self.urls)?;
        let write_result = fs::File::create(&temp_path)
            .and_then(|mut file| {
                file.write_all(content.as_bytes())?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&temp_path, &self.path));

        if let Err(e) = write_result {
            if temp_path.exists() {
                if let Err(cleanup) = fs::remove_file(&temp_path) {
                    warn!("Failed to remove {}: {}", temp_path.display(), cleanup);
                }
            }
            return Err(e).with_context(|| format!("Failed to write {}", self.path.display()));
        }

        debug!("Saved {} URLs to {}", self.urls.len(), self.path.display());
        Ok(())
    }
}

fn dedup_in_order(urls: Vec<String>) -> Vec<String> {
    urls.into_iter().unique().collect()
}

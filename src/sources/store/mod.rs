#[cfg(test)]
mod tests;

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{DocuError, Result};

const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// Supported stored document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Word,
    Pdf,
}

impl DocumentKind {
    #[inline]
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_string_lossy().to_ascii_lowercase();
        match extension.as_str() {
            "docx" => Some(Self::Word),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    /// Format sanity check run before a file is offered to extraction
    #[inline]
    pub fn is_valid(self, path: &Path) -> bool {
        match self {
            Self::Word => is_valid_docx(path),
            Self::Pdf => is_valid_pdf(path),
        }
    }
}

/// A Word file must be a zip archive holding at least one XML part
#[inline]
pub fn is_valid_docx(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let Ok(archive) = zip::ZipArchive::new(file) else {
        return false;
    };
    archive.file_names().any(|name| name.ends_with(".xml"))
}

/// A PDF file must begin with `%PDF-`
#[inline]
pub fn is_valid_pdf(path: &Path) -> bool {
    let Ok(mut file) = File::open(path) else {
        return false;
    };
    let mut signature = [0_u8; 5];
    file.read_exact(&mut signature).is_ok() && signature == PDF_SIGNATURE
}

/// Folder of uploaded Word and PDF documents
#[derive(Debug, Clone)]
pub struct DocumentStore {
    dir: PathBuf,
}

impl DocumentStore {
    #[inline]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Valid Word and PDF documents, each list sorted by file name.
    /// Files failing the format check are left out.
    #[inline]
    pub fn get_doc_paths(&self) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
        let mut word = Vec::new();
        let mut pdf = Vec::new();

        if !self.dir.exists() {
            return Ok((word, pdf));
        }

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(kind) = DocumentKind::from_path(&path) else {
                continue;
            };

            if !kind.is_valid(&path) {
                warn!("Skipping invalid document: {}", path.display());
                continue;
            }

            match kind {
                DocumentKind::Word => word.push(path),
                DocumentKind::Pdf => pdf.push(path),
            }
        }

        word.sort();
        pdf.sort();
        debug!(
            "Found {} Word and {} PDF documents in {}",
            word.len(),
            pdf.len(),
            self.dir.display()
        );

        Ok((word, pdf))
    }

    /// Word documents first, then PDF documents
    #[inline]
    pub fn get_all_doc_paths(&self) -> Result<Vec<PathBuf>> {
        let (mut word, pdf) = self.get_doc_paths()?;
        word.extend(pdf);
        Ok(word)
    }

    /// Copy a file into the store, replacing any document with the same name
    #[inline]
    pub fn add(&self, source: &Path) -> Result<PathBuf> {
        let kind = DocumentKind::from_path(source).ok_or_else(|| {
            DocuError::Validation(format!(
                "Only .docx and .pdf files can be added: {}",
                source.display()
            ))
        })?;

        if !kind.is_valid(source) {
            return Err(DocuError::Validation(format!(
                "File is corrupt or not a real {kind:?} document: {}",
                source.display()
            )));
        }

        let name = source.file_name().ok_or_else(|| {
            DocuError::Validation(format!("Not a file path: {}", source.display()))
        })?;

        fs::create_dir_all(&self.dir)?;
        let target = self.dir.join(name);
        fs::copy(source, &target)?;
        debug!("Stored {} as {}", source.display(), target.display());

        Ok(target)
    }

    /// Delete a stored document by file name
    #[inline]
    pub fn remove(&self, name: &str) -> Result<PathBuf> {
        let path = self.dir.join(name);
        let is_stored = path.parent() == Some(self.dir.as_path())
            && DocumentKind::from_path(&path).is_some()
            && path.is_file();

        if !is_stored {
            return Err(DocuError::Validation(format!(
                "No stored document named '{name}'"
            )));
        }

        fs::remove_file(&path)?;
        debug!("Removed document {}", path.display());
        Ok(path)
    }
}

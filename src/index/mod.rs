// Persistent vector index
// Exact cosine-similarity search over embedded chunks, stored in a SQLite database inside the index directory

#[cfg(test)]
mod tests;

use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Transaction, TransactionBehavior, params};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::embeddings::Embedder;
use crate::embeddings::chunking::{Chunk, ChunkMetadata};
use crate::{DocuError, Result};

pub const INDEX_FILE_NAME: &str = "index.sqlite3";
const FORMAT_VERSION: u32 = 1;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS index_meta (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        format_version INTEGER NOT NULL,
        model TEXT NOT NULL,
        dimension INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS chunks (
        position INTEGER PRIMARY KEY,
        content TEXT NOT NULL,
        doc_name TEXT,
        page INTEGER,
        source TEXT,
        embedding BLOB NOT NULL
    );
";

#[derive(Debug, Clone, PartialEq)]
struct IndexEntry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Row of `index_meta`
struct StoredMeta {
    format_version: u32,
    model: String,
    dimension: usize,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// A retrieved chunk with its cosine similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// In-memory vector index over chunk embeddings
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    model: String,
    dimension: usize,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Embed every chunk and build a fresh index
    #[inline]
    pub fn create(embedder: &dyn Embedder, chunks: Vec<Chunk>) -> Result<Self> {
        if chunks.is_empty() {
            return Err(DocuError::EmptyBatch);
        }

        let vectors = embed_chunks(embedder, &chunks)?;
        let dimension = vectors.first().map(Vec::len).unwrap_or_default();
        let now = Utc::now();

        let mut index = Self {
            model: embedder.model_name().to_string(),
            dimension,
            created_at: now,
            updated_at: now,
            entries: Vec::with_capacity(chunks.len()),
        };
        index.insert(chunks, vectors)?;

        info!(
            "Created vector index with {} chunks ({} dimensions, model {})",
            index.len(),
            index.dimension,
            index.model
        );
        Ok(index)
    }

    /// Read a persisted index. Returns `None` when nothing has been committed at `path`.
    #[inline]
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !Self::exists(path) {
            debug!("No persisted index at {}", path.display());
            return Ok(None);
        }

        let index = read_index(&path.join(INDEX_FILE_NAME)).map_err(indexing_error)?;
        if let Some(index) = &index {
            debug!(
                "Loaded vector index with {} chunks from {}",
                index.len(),
                path.display()
            );
        }
        Ok(index)
    }

    /// Whether a persisted index database is present in the directory at `path`
    #[inline]
    pub fn exists(path: &Path) -> bool {
        path.join(INDEX_FILE_NAME).is_file()
    }

    /// Embed and add chunks without touching existing entries. Returns the number added.
    #[inline]
    pub fn append(&mut self, embedder: &dyn Embedder, chunks: Vec<Chunk>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        self.check_model(embedder).map_err(DocuError::Indexing)?;

        let vectors = embed_chunks(embedder, &chunks)?;
        let added = chunks.len();
        self.insert(chunks, vectors)?;
        self.updated_at = Utc::now();

        info!("Appended {} chunks (index now holds {})", added, self.len());
        Ok(added)
    }

    /// Write the index to `path`, replacing any previous version in one transaction.
    /// Readers see either the previous commit or this one. When the stored index is
    /// an earlier state of this one only the new rows are written.
    #[inline]
    pub fn persist(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create {}", path.display()))
            .map_err(indexing_error)?;

        let file_path = path.join(INDEX_FILE_NAME);
        let written = self.write_to(&file_path).map_err(indexing_error)?;
        info!(
            "Persisted {} chunks to {} ({} rows written)",
            self.len(),
            path.display(),
            written
        );
        Ok(())
    }

    fn write_to(&self, file_path: &Path) -> anyhow::Result<usize> {
        let mut conn = Connection::open(file_path)
            .with_context(|| format!("Failed to open {}", file_path.display()))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let journal_mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .context("Failed to enable write-ahead logging")?;
        debug!("Index journal mode: {}", journal_mode);
        conn.execute_batch(SCHEMA)
            .context("Failed to create index tables")?;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let first_new = self.first_unstored_row(&tx)?;
        if first_new == 0 {
            tx.execute("DELETE FROM chunks", [])?;
        }

        {
            let mut insert = tx.prepare(
                "INSERT INTO chunks (position, content, doc_name, page, source, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (position, entry) in self.entries.iter().enumerate().skip(first_new) {
                let metadata = &entry.chunk.metadata;
                insert.execute(params![
                    i64::try_from(position)?,
                    entry.chunk.content,
                    metadata.doc_name,
                    metadata.page,
                    metadata.source,
                    encode_vector(&entry.vector),
                ])?;
            }
        }

        tx.execute(
            "INSERT OR REPLACE INTO index_meta
                 (id, format_version, model, dimension, created_at, updated_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5)",
            params![
                FORMAT_VERSION,
                self.model,
                i64::try_from(self.dimension)?,
                self.created_at,
                self.updated_at,
            ],
        )?;
        tx.commit().context("Failed to commit index")?;

        Ok(self.entries.len() - first_new)
    }

    /// Rows already stored for this index lineage, or 0 when the table must be rewritten
    fn first_unstored_row(&self, tx: &Transaction<'_>) -> anyhow::Result<usize> {
        let Some(meta) = read_meta(tx)? else {
            return Ok(0);
        };
        if meta.model != self.model || meta.created_at != self.created_at {
            return Ok(0);
        }

        let stored: i64 = tx.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        let stored = usize::try_from(stored)?;
        Ok(if stored <= self.entries.len() { stored } else { 0 })
    }

    /// Remove a persisted index. Missing indexes are not an error.
    #[inline]
    pub fn destroy(path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove index at {}", path.display()))
            .map_err(indexing_error)?;
        info!("Destroyed vector index at {}", path.display());
        Ok(())
    }

    /// The `k` chunks most similar to `query`, best first
    #[inline]
    pub fn search(&self, embedder: &dyn Embedder, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        self.check_model(embedder).map_err(DocuError::Retrieval)?;

        let query_vector = embedder
            .embed_query(query)
            .map_err(|e| DocuError::Retrieval(format!("{e:#}")))?;

        if query_vector.len() != self.dimension {
            return Err(DocuError::Retrieval(format!(
                "Query embedding has {} dimensions, index has {}",
                query_vector.len(),
                self.dimension
            )));
        }

        Ok(self.nearest(&query_vector, k))
    }

    /// Rank entries against an already embedded query; ties keep insertion order
    #[inline]
    pub fn nearest(&self, query_vector: &[f32], k: usize) -> Vec<SearchHit> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine_similarity(query_vector, &entry.vector)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        scored
            .into_iter()
            .take(k)
            .filter_map(|(i, score)| {
                self.entries.get(i).map(|entry| SearchHit {
                    chunk: entry.chunk.clone(),
                    score,
                })
            })
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Indexed chunks in insertion order
    #[inline]
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|entry| &entry.chunk)
    }

    fn check_model(&self, embedder: &dyn Embedder) -> std::result::Result<(), String> {
        if embedder.model_name() == self.model {
            Ok(())
        } else {
            Err(format!(
                "Index was built with embedding model '{}' but '{}' is configured; re-index required",
                self.model,
                embedder.model_name()
            ))
        }
    }

    fn insert(&mut self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<()> {
        if let Some(vector) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(DocuError::Indexing(format!(
                "Embedding has {} dimensions, index has {}",
                vector.len(),
                self.dimension
            )));
        }

        self.entries.extend(
            chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| IndexEntry { chunk, vector }),
        );
        Ok(())
    }
}

fn embed_chunks(embedder: &dyn Embedder, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
    let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
    let vectors = embedder
        .embed_documents(&texts)
        .map_err(|e| DocuError::Indexing(format!("Embedding failed: {e:#}")))?;

    if vectors.len() != chunks.len() {
        return Err(DocuError::Indexing(format!(
            "Embedding service returned {} vectors for {} chunks",
            vectors.len(),
            chunks.len()
        )));
    }
    if vectors.iter().any(Vec::is_empty) {
        return Err(DocuError::Indexing(
            "Embedding service returned an empty vector".to_string(),
        ));
    }

    Ok(vectors)
}

fn open_reader(file_path: &Path) -> anyhow::Result<Connection> {
    let conn = Connection::open_with_flags(
        file_path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("Failed to open {}", file_path.display()))?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

/// Read meta and rows from one snapshot. `None` until a first commit has landed.
fn read_index(file_path: &Path) -> anyhow::Result<Option<VectorIndex>> {
    let mut conn = open_reader(file_path)?;
    let tx = conn.transaction()?;

    let has_tables: bool = tx
        .query_row(
            "SELECT COUNT(*) = 2 FROM sqlite_master
             WHERE type = 'table' AND name IN ('index_meta', 'chunks')",
            [],
            |row| row.get(0),
        )
        .with_context(|| format!("{} is not a readable index", file_path.display()))?;
    if !has_tables {
        return Ok(None);
    }
    let Some(meta) = read_meta(&tx)? else {
        return Ok(None);
    };

    if meta.format_version != FORMAT_VERSION {
        anyhow::bail!(
            "Unsupported index format version {} in {}",
            meta.format_version,
            file_path.display()
        );
    }

    let mut select = tx.prepare(
        "SELECT position, content, doc_name, page, source, embedding
         FROM chunks ORDER BY position",
    )?;
    let rows = select.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            Chunk {
                content: row.get(1)?,
                metadata: ChunkMetadata {
                    doc_name: row.get(2)?,
                    page: row.get(3)?,
                    source: row.get(4)?,
                },
            },
            row.get::<_, Vec<u8>>(5)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (position, chunk, blob) = row?;
        if blob.len() != meta.dimension * size_of::<f32>() {
            anyhow::bail!(
                "Corrupt index: row {} holds {} embedding bytes, expected {} dimensions",
                position,
                blob.len(),
                meta.dimension
            );
        }
        entries.push(IndexEntry {
            chunk,
            vector: decode_vector(&blob),
        });
    }

    Ok(Some(VectorIndex {
        model: meta.model,
        dimension: meta.dimension,
        created_at: meta.created_at,
        updated_at: meta.updated_at,
        entries,
    }))
}

fn read_meta(conn: &Connection) -> anyhow::Result<Option<StoredMeta>> {
    let meta = conn
        .query_row(
            "SELECT format_version, model, dimension, created_at, updated_at
             FROM index_meta WHERE id = 1",
            [],
            |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, DateTime<Utc>>(3)?,
                    row.get::<_, DateTime<Utc>>(4)?,
                ))
            },
        )
        .optional()
        .context("Failed to read index metadata")?;

    meta.map(|(format_version, model, dimension, created_at, updated_at)| {
        Ok(StoredMeta {
            format_version,
            model,
            dimension: usize::try_from(dimension)?,
            created_at,
            updated_at,
        })
    })
    .transpose()
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|value| value.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect()
}

fn indexing_error(error: anyhow::Error) -> DocuError {
    DocuError::Indexing(format!("{error:#}"))
}

/// Cosine similarity, 0.0 when either vector has zero length
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0_f32, 0.0_f32, 0.0_f32), |(dot, na, nb), (x, y)| {
            (x.mul_add(*y, dot), x.mul_add(*x, na), y.mul_add(*y, nb))
        });

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

// Embeddings module
// Content chunking and the embedding service client

pub mod chunking;
pub mod openai;

pub use chunking::{Chunk, ChunkMetadata, ChunkingConfig, chunk, chunk_segments, split_text};
pub use openai::EmbeddingClient;

/// Turns text into fixed-length vectors
pub trait Embedder {
    /// One vector per input, in input order
    fn embed_documents(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    #[inline]
    fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_documents(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding service returned no vector for the query"))
    }

    /// Identifier stored with the index so vectors from different models never mix
    fn model_name(&self) -> &str;
}

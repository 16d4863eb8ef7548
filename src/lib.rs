use thiserror::Error;

pub type Result<T> = std::result::Result<T, DocuError>;

#[derive(Error, Debug)]
pub enum DocuError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Indexing error: {0}")]
    Indexing(String),

    #[error("Cannot build a vector index from an empty batch of chunks")]
    EmptyBatch,

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod answering;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod indexer;
pub mod registry;
pub mod service;
pub mod session;
pub mod sources;

// Lets the shared test fakes name this crate the same way from unit and integration tests
#[cfg(test)]
extern crate self as docu_whisperer;

#[cfg(test)]
pub(crate) mod testing;

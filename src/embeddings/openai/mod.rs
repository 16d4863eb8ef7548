
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::service::ServiceClient;

/// Client for an OpenAI-compatible `/embeddings` endpoint
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    service: ServiceClient,
    model: String,
    batch_size: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = config
            .service_url()
            .context("Failed to generate embedding service URL from config")?;

        let service = ServiceClient::new(
            base_url,
            config.resolved_api_key(),
            Duration::from_secs(config.timeout_seconds),
        )
        .with_retry_attempts(config.retry_attempts);

        Ok(Self {
            service,
            model: config.model.clone(),
            batch_size: config.batch_size.max(1) as usize,
        })
    }

    #[inline]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.service = self.service.with_backoff(backoff);
        self
    }

    fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response: EmbeddingResponse = self
            .service
            .post_json("embeddings", &request)
            .context("Failed to generate embeddings")?;

        if response.data.len() != texts.len() {
            bail!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.data.len()
            );
        }

        let mut data = response.data;
        if data.iter().all(|item| item.index.is_some()) {
            data.sort_by_key(|item| item.index);
        }

        Ok(data.into_iter().map(|item| item.embedding).collect())
    }
}

impl Embedder for EmbeddingClient {
    #[inline]
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Embedding {} texts with {} in batches of {}",
            texts.len(),
            self.model,
            self.batch_size
        );

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let batch_vectors = self
                .embed_single_batch(batch)
                .with_context(|| format!("Failed to process batch of {} texts", batch.len()))?;
            vectors.extend(batch_vectors);
        }

        if let Some(dimension) = vectors.first().map(Vec::len) {
            if dimension == 0 || vectors.iter().any(|v| v.len() != dimension) {
                bail!("Embedding service returned vectors of inconsistent dimension");
            }
        }

        debug!("Generated {} embeddings total", vectors.len());
        Ok(vectors)
    }

    #[inline]
    fn model_name(&self) -> &str {
        &self.model
    }
}

//! Embedding provider backed by an OpenAI-compatible `/embeddings` endpoint.
//!
//! Works with OpenAI itself, Ollama's `/v1` surface, LM Studio and similar
//! servers. The whole corpus is sent in one batched request.

use super::{Embedder, ProviderError};
use crate::config::EmbeddingConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible `/embeddings` endpoint (OpenAI, Ollama,
/// LM Studio, vLLM and friends). All texts of a run go out in one request.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiEmbedder {
    /// Build an embedder from its configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Endpoint base URL, model name and request timeout
    /// * `api_key` - Bearer token, if the endpoint requires one
    pub fn new(config: &EmbeddingConfig, api_key: Option<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/embeddings", config.endpoint.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
        })
    }
}

impl Embedder for OpenAiEmbedder {
    #[instrument(level = "info", skip_all, fields(count = texts.len(), model = %self.model))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let t0 = Instant::now();
        let mut request = self.client.post(&self.url).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(%status, url = %self.url, "Embedding request rejected");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let mut body: EmbeddingResponse = response.json().await?;
        // Servers may answer out of order; `index` is authoritative when present.
        body.data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
        let vectors: Vec<Vec<f32>> = body.data.into_iter().map(|d| d.embedding).collect();

        if vectors.is_empty() {
            return Err(ProviderError::Empty);
        }
        if vectors.len() != texts.len() {
            return Err(ProviderError::LengthMismatch {
                expected: texts.len(),
                got: vectors.len(),
            });
        }

        debug!(dims = vectors[0].len(), "Embedding dimensions");
        info!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Embedded corpus"
        );
        Ok(vectors)
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::config::OpenAIConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::retry::with_timeout;

const PROVIDER: &str = "OpenAI";

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// Uses `reqwest` to call the `/embeddings` endpoint directly. Large batches
/// are split into requests of [`OpenAIConfig::embed_batch_size`] inputs; each
/// request is retried on rate limiting, server errors and timeouts.
///
/// # Example
///
/// ```rust,ignore
/// use pdfchat_rag::openai::{OpenAIConfig, OpenAIEmbeddingProvider};
///
/// let provider = OpenAIEmbeddingProvider::new(OpenAIConfig::from_env()?);
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    config: OpenAIConfig,
    url: String,
}

impl OpenAIEmbeddingProvider {
    pub fn new(config: OpenAIConfig) -> Self {
        let url = format!("{}/embeddings", config.api_base());
        Self { client: reqwest::Client::new(), config, url }
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    /// One embeddings request, without retries.
    async fn request(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest { model: &self.config.embedding_model, input: inputs };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::UnavailableError {
                service: PROVIDER.into(),
                message: format!("request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            let message = format!("API returned {status}: {detail}");
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(RagError::UnavailableError { service: PROVIDER.into(), message });
            }
            return Err(RagError::EmbeddingError {
                provider: PROVIDER.into(),
                message,
                failed_inputs: Vec::new(),
            });
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| RagError::EmbeddingError {
            provider: PROVIDER.into(),
            message: format!("failed to parse response: {e}"),
            failed_inputs: Vec::new(),
        })?;

        let mut rows = parsed.data;
        if rows.len() != inputs.len() {
            return Err(RagError::EmbeddingError {
                provider: PROVIDER.into(),
                message: format!("expected {} embeddings, got {}", inputs.len(), rows.len()),
                failed_inputs: Vec::new(),
            });
        }
        rows.sort_by_key(|row| row.index);
        Ok(rows.into_iter().map(|row| row.embedding).collect())
    }

    /// Convert the last error of a batch into the caller-facing error.
    fn batch_error(&self, e: RagError, failed_inputs: Vec<usize>) -> RagError {
        match e {
            RagError::TimeoutError { .. } => e,
            RagError::UnavailableError { message, .. } => RagError::EmbeddingError {
                provider: PROVIDER.into(),
                message: format!("retries exhausted: {message}"),
                failed_inputs,
            },
            RagError::EmbeddingError { provider, message, .. } => {
                RagError::EmbeddingError { provider, message, failed_inputs }
            }
            other => other,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| RagError::EmbeddingError {
            provider: PROVIDER.into(),
            message: "API returned empty response".into(),
            failed_inputs: vec![0],
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = self.config.embed_batch_size.max(1);
        let mut vectors = Vec::with_capacity(texts.len());

        for (batch_index, batch) in texts.chunks(batch_size).enumerate() {
            let offset = batch_index * batch_size;
            debug!(
                provider = PROVIDER,
                offset,
                batch_size = batch.len(),
                model = %self.config.embedding_model,
                "embedding batch"
            );

            let timeout = self.config.request_timeout;
            let outcome = self
                .config
                .retry
                .execute("openai.embeddings", move || {
                    with_timeout("openai.embeddings", timeout, self.request(batch))
                })
                .await;

            match outcome {
                Ok(batch_vectors) => vectors.extend(batch_vectors),
                Err(e) => {
                    error!(provider = PROVIDER, offset, error = %e, "embedding batch failed");
                    return Err(self.batch_error(e, (offset..texts.len()).collect()));
                }
            }
        }

        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.config.embedding_dimensions
    }
}

use std::fmt;
use std::time::Duration;

use crate::error::{RagError, Result};
use crate::retry::RetryPolicy;

/// The default OpenAI API base, including the version prefix.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Settings shared by [`OpenAIEmbeddingProvider`](super::OpenAIEmbeddingProvider)
/// and [`OpenAIChatModel`](super::OpenAIChatModel).
#[derive(Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    /// API base for OpenAI-compatible servers. Defaults to [`DEFAULT_BASE_URL`].
    pub base_url: Option<String>,
    pub embedding_model: String,
    /// Dimensionality of `embedding_model`'s vectors.
    pub embedding_dimensions: usize,
    /// Inputs per embeddings request.
    pub embed_batch_size: usize,
    pub chat_model: String,
    pub temperature: f32,
    /// Limit for each embeddings request and for the first chunk of a chat stream.
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl OpenAIConfig {
    /// Create a config with the default models.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the key is empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RagError::ConfigError("OpenAI API key must not be empty".to_string()));
        }
        Ok(Self {
            api_key,
            base_url: None,
            embedding_model: "text-embedding-ada-002".to_string(),
            embedding_dimensions: 1536,
            embed_batch_size: 512,
            chat_model: "gpt-4-1106-preview".to_string(),
            temperature: 0.0,
            request_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        })
    }

    /// Read the key from `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            RagError::ConfigError("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        Self::new(api_key)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.embedding_model = model.into();
        self.embedding_dimensions = dimensions;
        self
    }

    pub fn with_embed_batch_size(mut self, size: usize) -> Self {
        self.embed_batch_size = size.max(1);
        self
    }

    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The API base without a trailing slash.
    pub fn api_base(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/')
    }
}

impl fmt::Debug for OpenAIConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAIConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.api_base())
            .field("embedding_model", &self.embedding_model)
            .field("embedding_dimensions", &self.embedding_dimensions)
            .field("embed_batch_size", &self.embed_batch_size)
            .field("chat_model", &self.chat_model)
            .field("temperature", &self.temperature)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(OpenAIConfig::new("  "), Err(RagError::ConfigError(_))));
    }

    #[test]
    fn debug_hides_the_key() {
        let config = OpenAIConfig::new("sk-secret").unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("text-embedding-ada-002"));
    }

    #[test]
    fn api_base_drops_trailing_slash() {
        let config = OpenAIConfig::new("k").unwrap().with_base_url("http://localhost:1234/v1/");
        assert_eq!(config.api_base(), "http://localhost:1234/v1");
        assert_eq!(OpenAIConfig::new("k").unwrap().api_base(), DEFAULT_BASE_URL);
    }
}

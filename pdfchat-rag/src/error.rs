//! Error types for the `pdfchat-rag` crate.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while ingesting documents or answering questions.
#[derive(Debug, Error)]
pub enum RagError {
    /// A document could not be read or parsed.
    #[error("Load error ({}): {message}", path.display())]
    LoadError {
        /// The file that failed to load.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// The embedding service failed after retries were exhausted.
    #[error("Embedding error ({provider}): {message} (failed inputs: {failed_inputs:?})")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
        /// Indices of the inputs that did not receive an embedding.
        failed_inputs: Vec<usize>,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A vector does not have the dimensionality of its collection.
    #[error("Dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatchError {
        /// The collection dimensionality.
        expected: usize,
        /// The offending vector length.
        actual: usize,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Caller input was rejected.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// An external call did not complete in time.
    #[error("Timeout: {operation} did not complete within {after:?}")]
    TimeoutError {
        /// The operation that timed out.
        operation: String,
        /// The configured limit.
        after: Duration,
    },

    /// The language model call failed.
    #[error("Generation error ({model}): {message}")]
    GenerationError {
        /// The model that produced the error.
        model: String,
        /// A description of the failure.
        message: String,
    },

    /// A transient failure of an external service; retried by [`RetryPolicy`](crate::RetryPolicy).
    #[error("{service} unavailable: {message}")]
    UnavailableError {
        /// The service that could not be reached.
        service: String,
        /// A description of the failure.
        message: String,
    },
}

impl RagError {
    /// Classify this error into one of the public [`ErrorKind`]s.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LoadError { .. } => ErrorKind::Load,
            Self::EmbeddingError { .. } => ErrorKind::Embed,
            Self::VectorStoreError { .. } => ErrorKind::VectorStore,
            Self::DimensionMismatchError { .. } | Self::ConfigError(_) => ErrorKind::Config,
            Self::ValidationError(_) => ErrorKind::Validation,
            Self::TimeoutError { .. } => ErrorKind::Timeout,
            Self::GenerationError { .. } => ErrorKind::Generation,
            Self::UnavailableError { .. } => ErrorKind::Unavailable,
        }
    }

    /// Whether retrying the failed call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::UnavailableError { .. } | Self::TimeoutError { .. })
    }
}

/// Coarse error classification exposed to callers and over HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Load,
    Embed,
    VectorStore,
    Config,
    Validation,
    Timeout,
    Generation,
    Unavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Load => "LoadError",
            Self::Embed => "EmbedError",
            Self::VectorStore => "VectorStoreError",
            Self::Config => "ConfigError",
            Self::Validation => "ValidationError",
            Self::Timeout => "TimeoutError",
            Self::Generation => "GenerationError",
            Self::Unavailable => "UnavailableError",
        };
        f.write_str(name)
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_mismatch_is_a_config_error() {
        let err = RagError::DimensionMismatchError { expected: 1536, actual: 3 };
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(err.kind().to_string(), "ConfigError");
    }

    #[test]
    fn only_unavailable_and_timeout_are_transient() {
        let timeout = RagError::TimeoutError { operation: "embed".into(), after: Duration::from_secs(1) };
        let unavailable = RagError::UnavailableError { service: "openai".into(), message: "503".into() };
        assert!(timeout.is_transient());
        assert!(unavailable.is_transient());
        assert!(!RagError::ValidationError("empty".into()).is_transient());
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::VectorStore).unwrap();
        assert_eq!(json, "\"vector_store\"");
    }
}

//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates the ingestion workflow (load → chunk →
//! embed → store) and the retrieval half of the query workflow (embed →
//! search → filter) by composing an [`EmbeddingProvider`], a
//! [`CollectionHandle`], and a [`Chunker`].
//!
//! # Example
//!
//! ```rust,ignore
//! use pdfchat_rag::{CollectionSpec, InMemoryVectorStore, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()), CollectionSpec::default())
//!     .build()?;
//!
//! pipeline.ensure_collection().await?;
//! pipeline.ingest(&document).await?;
//! let results = pipeline.retrieve("search query", None).await?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::document::{Document, MetadataFilter, SearchResult, VectorEntry};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::loader::{DirectoryLoader, LoadPolicy};
use crate::vectorstore::{CollectionHandle, CollectionSpec, VectorStore};

/// A file that was skipped during ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Summary of a directory ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Documents loaded, chunked, embedded and stored.
    pub documents: usize,
    /// Chunks written to the collection.
    pub chunks: usize,
    /// Files skipped under [`LoadPolicy::SkipAndLog`].
    pub failures: Vec<LoadFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The RAG pipeline orchestrator.
///
/// Construct one via [`RagPipeline::builder()`]. The pipeline is immutable and
/// can be shared behind an `Arc` by concurrent queries.
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    collection: CollectionHandle,
    chunker: Arc<dyn Chunker>,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return the collection both pipelines read and write.
    pub fn collection(&self) -> &CollectionHandle {
        &self.collection
    }

    /// Create the collection if needed.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the embedding provider's dimensionality
    /// differs from the collection's, or if the existing collection has a
    /// different shape.
    pub async fn ensure_collection(&self) -> Result<()> {
        let dimensions = self.embedding_provider.dimensions();
        let spec = self.collection.spec();
        if dimensions != spec.dimension {
            return Err(RagError::ConfigError(format!(
                "embedding provider produces {dimensions}-dimensional vectors but collection '{}' expects {}",
                spec.name, spec.dimension
            )));
        }
        self.collection.ensure().await.inspect_err(|e| {
            error!(collection = %spec.name, error = %e, "failed to ensure collection");
        })
    }

    /// Ingest a single document: chunk → embed → store.
    ///
    /// Returns the number of chunks stored.
    ///
    /// # Errors
    ///
    /// Propagates embedding and storage errors. If the store rejects some
    /// entries, returns [`RagError::VectorStoreError`] naming them; the accepted
    /// entries remain committed.
    pub async fn ingest(&self, document: &Document) -> Result<usize> {
        let chunks = self.chunker.chunk(document);
        if chunks.is_empty() {
            info!(document.id = %document.id, chunk_count = 0, "ingested document (empty)");
            return Ok(0);
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedding_provider.embed_batch(&texts).await.inspect_err(|e| {
            error!(document.id = %document.id, error = %e, "embedding failed during ingestion");
        })?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::EmbeddingError {
                provider: "pipeline".to_string(),
                message: format!(
                    "expected {} embeddings for document '{}', got {}",
                    chunks.len(),
                    document.id,
                    embeddings.len()
                ),
                failed_inputs: (embeddings.len()..chunks.len()).collect(),
            });
        }

        let entries: Vec<VectorEntry> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, vector)| VectorEntry::from_chunk(chunk, vector))
            .collect();

        let report = self.collection.upsert(&entries).await.inspect_err(|e| {
            error!(document.id = %document.id, error = %e, "upsert failed during ingestion");
        })?;
        if !report.is_complete() {
            let failed: Vec<&str> = report.failed.iter().map(|f| f.id.as_str()).collect();
            error!(document.id = %document.id, failed = ?failed, "store rejected entries");
            return Err(RagError::VectorStoreError {
                backend: self.collection.name().to_string(),
                message: format!(
                    "{} of {} entries for document '{}' were not stored: {}",
                    report.failed.len(),
                    entries.len(),
                    document.id,
                    report
                        .failed
                        .iter()
                        .map(|f| format!("{} ({})", f.id, f.reason))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            });
        }

        let chunk_count = report.succeeded.len();
        info!(document.id = %document.id, chunk_count, "ingested document");
        Ok(chunk_count)
    }

    /// Ingest multiple documents, stopping at the first failure.
    ///
    /// Returns the total number of chunks stored.
    pub async fn ingest_batch(&self, documents: &[Document]) -> Result<usize> {
        let mut total = 0;
        for document in documents {
            total += self.ingest(document).await?;
        }
        Ok(total)
    }

    /// Load every matching file under the loader's root and ingest it.
    ///
    /// Load failures are handled according to the loader's [`LoadPolicy`];
    /// embedding and storage failures always abort.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ValidationError`] if no files match, the first
    /// [`RagError::LoadError`] under [`LoadPolicy::Abort`], or any embedding or
    /// storage error.
    pub async fn ingest_directory(&self, loader: &DirectoryLoader) -> Result<IngestReport> {
        let started_at = Utc::now();
        let files = loader.discover()?;
        if files.is_empty() {
            return Err(RagError::ValidationError(format!(
                "no documents matching '{}' under '{}'",
                loader.config().pattern,
                loader.config().root.display()
            )));
        }
        info!(files = files.len(), collection = %self.collection.name(), "starting ingestion");

        let policy = loader.config().policy;
        let mut documents = loader.load_paths(files);
        let mut report = IngestReport {
            documents: 0,
            chunks: 0,
            failures: Vec::new(),
            started_at,
            finished_at: started_at,
        };

        while let Some(outcome) = documents.next().await {
            match outcome {
                Ok(document) => {
                    report.chunks += self.ingest(&document).await?;
                    report.documents += 1;
                }
                Err(RagError::LoadError { path, message }) if policy == LoadPolicy::SkipAndLog => {
                    warn!(path = %path.display(), error = %message, "skipping document");
                    report.failures.push(LoadFailure { path, message });
                }
                Err(e) => {
                    error!(error = %e, "aborting ingestion");
                    return Err(e);
                }
            }
        }

        report.finished_at = Utc::now();
        info!(
            documents = report.documents,
            chunks = report.chunks,
            failures = report.failures.len(),
            "ingestion finished"
        );
        Ok(report)
    }

    /// Retrieve the chunks most similar to `query`: embed → search → filter by threshold.
    ///
    /// Returns up to `top_k` results ordered by descending score. An empty
    /// collection yields an empty `Vec`.
    pub async fn retrieve(
        &self,
        query: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchResult>> {
        self.retrieve_top_k(query, self.config.top_k, filter).await
    }

    /// [`retrieve`](Self::retrieve) with an explicit `top_k`.
    pub async fn retrieve_top_k(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchResult>> {
        let query_embedding = self.embedding_provider.embed(query).await.inspect_err(|e| {
            error!(error = %e, "embedding failed during query");
        })?;

        let results = self.collection.query(&query_embedding, top_k, filter).await.inspect_err(
            |e| {
                error!(collection = %self.collection.name(), error = %e, "vector store search failed");
            },
        )?;

        let threshold = self.config.similarity_threshold;
        let filtered: Vec<SearchResult> =
            results.into_iter().filter(|r| r.score >= threshold).collect();

        info!(result_count = filtered.len(), "retrieval completed");
        Ok(filtered)
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `config`, `embedding_provider` and the collection are required. The
/// chunker defaults to a [`RecursiveChunker`] built from the config.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    collection: Option<CollectionHandle>,
    chunker: Option<Arc<dyn Chunker>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the collection handle.
    pub fn collection(mut self, collection: CollectionHandle) -> Self {
        self.collection = Some(collection);
        self
    }

    /// Bind `store` to the collection described by `spec`.
    pub fn vector_store(self, store: Arc<dyn VectorStore>, spec: CollectionSpec) -> Self {
        self.collection(CollectionHandle::new(store, spec))
    }

    /// Override the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any required field is missing or the
    /// config is invalid.
    pub fn build(self) -> Result<RagPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let collection = self
            .collection
            .ok_or_else(|| RagError::ConfigError("vector store collection is required".to_string()))?;
        let chunker = self
            .chunker
            .unwrap_or_else(|| Arc::new(RecursiveChunker::from_config(&config)));

        Ok(RagPipeline { config, embedding_provider, collection, chunker })
    }
}

//! Vector store trait for storing and searching vector embeddings.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{MetadataFilter, SearchResult, VectorEntry};
use crate::error::Result;

/// Distance metric used to rank entries of a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    DotProduct,
    Euclidean,
}

impl DistanceMetric {
    /// The metric's name on the wire (`cosine`, `dotproduct`, `euclidean`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::DotProduct => "dotproduct",
            Self::Euclidean => "euclidean",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The shape of a named collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
}

impl CollectionSpec {
    pub fn new(name: impl Into<String>, dimension: usize, metric: DistanceMetric) -> Self {
        Self { name: name.into(), dimension, metric }
    }
}

impl Default for CollectionSpec {
    fn default() -> Self {
        Self::new("collectiondb", 1536, DistanceMetric::Cosine)
    }
}

/// An entry that was not committed by [`VectorStore::upsert`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedEntry {
    pub id: String,
    pub reason: String,
}

/// Per-entry outcome of an upsert. Entries in `succeeded` stay committed even
/// when others failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpsertReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<FailedEntry>,
}

impl UpsertReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: UpsertReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }
}

/// A storage backend for vector embeddings with similarity search.
///
/// Implementations manage named collections of [`VectorEntry`]s and support
/// upserting and searching by vector similarity.
///
/// # Example
///
/// ```rust,ignore
/// use pdfchat_rag::{CollectionSpec, InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.ensure_collection(&CollectionSpec::default()).await?;
/// store.upsert("collectiondb", &entries).await?;
/// let results = store.query("collectiondb", &query_embedding, 4, None).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a collection if it does not exist.
    ///
    /// Fails with [`RagError::ConfigError`](crate::RagError::ConfigError) and writes
    /// nothing if the collection exists with a different dimension or metric.
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<()>;

    /// Delete a named collection and all its data.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Upsert entries into a collection, reporting the outcome per entry.
    async fn upsert(&self, collection: &str, entries: &[VectorEntry]) -> Result<UpsertReport>;

    /// Return up to `top_k` entries nearest to `vector`, ordered by
    /// descending similarity. An empty collection yields an empty `Vec`.
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchResult>>;
}

/// A [`VectorStore`] bound to one collection.
///
/// Both the ingestion and the query pipeline hold a clone of the same handle.
#[derive(Clone)]
pub struct CollectionHandle {
    store: Arc<dyn VectorStore>,
    spec: CollectionSpec,
}

impl CollectionHandle {
    pub fn new(store: Arc<dyn VectorStore>, spec: CollectionSpec) -> Self {
        Self { store, spec }
    }

    pub fn spec(&self) -> &CollectionSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub async fn ensure(&self) -> Result<()> {
        self.store.ensure_collection(&self.spec).await
    }

    pub async fn upsert(&self, entries: &[VectorEntry]) -> Result<UpsertReport> {
        self.store.upsert(&self.spec.name, entries).await
    }

    pub async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchResult>> {
        self.store.query(&self.spec.name, vector, top_k, filter).await
    }
}

impl fmt::Debug for CollectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionHandle").field("spec", &self.spec).finish_non_exhaustive()
    }
}

//! In-memory vector store.
//!
//! This module provides [`InMemoryVectorStore`], a zero-dependency vector store
//! backed by a `HashMap` protected by a `tokio::sync::RwLock`. It is suitable
//! for development, testing, and small corpora.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{MetadataFilter, SearchResult, VectorEntry};
use crate::error::{RagError, Result};
use crate::vectorstore::{CollectionSpec, DistanceMetric, FailedEntry, UpsertReport, VectorStore};

const BACKEND: &str = "InMemory";

#[derive(Debug)]
struct Collection {
    spec: CollectionSpec,
    entries: HashMap<String, VectorEntry>,
}

/// An in-memory vector store.
///
/// Collections are stored as nested `HashMap`s: collection name → entry ID → entry.
/// All operations are async-safe via `tokio::sync::RwLock`.
///
/// # Example
///
/// ```rust,ignore
/// use pdfchat_rag::{CollectionSpec, InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.ensure_collection(&CollectionSpec::default()).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries stored in `collection`, or `None` if it does not exist.
    pub async fn len(&self, collection: &str) -> Option<usize> {
        self.collections.read().await.get(collection).map(|c| c.entries.len())
    }

    fn missing(collection: &str) -> RagError {
        RagError::VectorStoreError {
            backend: BACKEND.to_string(),
            message: format!("collection '{collection}' does not exist"),
        }
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Similarity under `metric`; higher always means closer.
fn similarity(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Cosine => cosine_similarity(a, b),
        DistanceMetric::DotProduct => a.iter().zip(b.iter()).map(|(x, y)| x * y).sum(),
        DistanceMetric::Euclidean => {
            let distance: f32 =
                a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt();
            1.0 / (1.0 + distance)
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<()> {
        let mut collections = self.collections.write().await;
        if let Some(existing) = collections.get(&spec.name) {
            if existing.spec.dimension != spec.dimension {
                return Err(RagError::ConfigError(format!(
                    "collection '{}' has dimension {}, requested {}",
                    spec.name, existing.spec.dimension, spec.dimension
                )));
            }
            if existing.spec.metric != spec.metric {
                return Err(RagError::ConfigError(format!(
                    "collection '{}' uses metric {}, requested {}",
                    spec.name, existing.spec.metric, spec.metric
                )));
            }
            return Ok(());
        }
        collections
            .insert(spec.name.clone(), Collection { spec: spec.clone(), entries: HashMap::new() });
        debug!(collection = %spec.name, dimension = spec.dimension, "created in-memory collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.remove(name);
        Ok(())
    }

    async fn upsert(&self, collection: &str, entries: &[VectorEntry]) -> Result<UpsertReport> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| Self::missing(collection))?;

        let mut report = UpsertReport::default();
        for entry in entries {
            if entry.vector.len() != store.spec.dimension {
                report.failed.push(FailedEntry {
                    id: entry.id.clone(),
                    reason: RagError::DimensionMismatchError {
                        expected: store.spec.dimension,
                        actual: entry.vector.len(),
                    }
                    .to_string(),
                });
                continue;
            }
            store.entries.insert(entry.id.clone(), entry.clone());
            report.succeeded.push(entry.id.clone());
        }
        Ok(report)
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| Self::missing(collection))?;
        if vector.len() != store.spec.dimension {
            return Err(RagError::DimensionMismatchError {
                expected: store.spec.dimension,
                actual: vector.len(),
            });
        }

        let metric = store.spec.metric;
        let mut scored: Vec<SearchResult> = store
            .entries
            .values()
            .filter(|entry| filter.is_none_or(|f| f.matches(&entry.metadata)))
            .map(|entry| SearchResult {
                entry: entry.clone(),
                score: similarity(metric, &entry.vector, vector),
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn entry(id: &str, vector: Vec<f32>) -> VectorEntry {
        VectorEntry {
            id: id.into(),
            vector,
            text: id.into(),
            document_id: "doc".into(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn query_on_empty_collection_is_empty() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection(&CollectionSpec::new("c", 2, DistanceMetric::Cosine)).await.unwrap();
        let results = store.query("c", &[1.0, 0.0], 4, None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn ensure_collection_rejects_dimension_change_without_writing() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection(&CollectionSpec::new("c", 2, DistanceMetric::Cosine)).await.unwrap();
        store.upsert("c", &[entry("a", vec![1.0, 0.0])]).await.unwrap();

        let err = store
            .ensure_collection(&CollectionSpec::new("c", 3, DistanceMetric::Cosine))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
        assert_eq!(store.len("c").await, Some(1));

        // idempotent for the original shape
        store.ensure_collection(&CollectionSpec::new("c", 2, DistanceMetric::Cosine)).await.unwrap();
        assert_eq!(store.len("c").await, Some(1));
    }

    #[tokio::test]
    async fn upsert_reports_entries_with_wrong_dimension() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection(&CollectionSpec::new("c", 2, DistanceMetric::Cosine)).await.unwrap();
        let report = store
            .upsert("c", &[entry("ok", vec![1.0, 0.0]), entry("bad", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(report.succeeded, vec!["ok".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, "bad");
        assert_eq!(store.len("c").await, Some(1));
    }

    #[tokio::test]
    async fn query_rejects_wrong_dimension() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection(&CollectionSpec::new("c", 2, DistanceMetric::Cosine)).await.unwrap();
        let err = store.query("c", &[1.0], 1, None).await.unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatchError { expected: 2, actual: 1 }));
    }

    #[tokio::test]
    async fn filter_restricts_candidates() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection(&CollectionSpec::new("c", 2, DistanceMetric::Cosine)).await.unwrap();
        let mut tagged = entry("tagged", vec![0.0, 1.0]);
        tagged.metadata.insert("source".into(), "b.pdf".into());
        store.upsert("c", &[entry("plain", vec![1.0, 0.0]), tagged]).await.unwrap();

        let filter = MetadataFilter::new().equals("source", "b.pdf");
        let results = store.query("c", &[1.0, 0.0], 4, Some(&filter)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entry.id, "tagged");
    }

    #[tokio::test]
    async fn euclidean_ranks_nearest_first() {
        let store = InMemoryVectorStore::new();
        store
            .ensure_collection(&CollectionSpec::new("e", 1, DistanceMetric::Euclidean))
            .await
            .unwrap();
        store.upsert("e", &[entry("near", vec![1.0]), entry("far", vec![10.0])]).await.unwrap();
        let results = store.query("e", &[0.0], 2, None).await.unwrap();
        assert_eq!(results[0].entry.id, "near");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn missing_collection_is_a_store_error() {
        let store = InMemoryVectorStore::new();
        let err = store.query("nope", &[1.0], 1, None).await.unwrap_err();
        assert!(matches!(err, RagError::VectorStoreError { .. }));
    }
}

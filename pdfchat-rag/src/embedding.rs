//! The embedding seam between the ingestion and query pipelines and a model.

use async_trait::async_trait;

use crate::error::Result;

/// Turns text into fixed-length vectors.
///
/// Both pipelines must embed through the same provider, otherwise stored
/// chunks and questions land in different vector spaces. Only
/// [`embed`](EmbeddingProvider::embed) is required; providers with a batch
/// endpoint override [`embed_batch`](EmbeddingProvider::embed_batch).
///
/// Batches preserve order: the `i`-th vector belongs to the `i`-th input.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use pdfchat_rag::{EmbeddingProvider, Result};
///
/// struct LengthEmbedder;
///
/// #[async_trait]
/// impl EmbeddingProvider for LengthEmbedder {
///     async fn embed(&self, text: &str) -> Result<Vec<f32>> {
///         Ok(vec![text.len() as f32, 1.0])
///     }
///
///     fn dimensions(&self) -> usize {
///         2
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<()> {
/// let vectors = LengthEmbedder.embed_batch(&["a", "abc", "ab"]).await?;
/// let lengths: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
/// assert_eq!(lengths, vec![1.0, 3.0, 2.0]);
/// assert!(vectors.iter().all(|v| v.len() == LengthEmbedder.dimensions()));
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, one vector per input in input order.
    ///
    /// Defaults to calling [`embed`](EmbeddingProvider::embed) once per input
    /// and stops at the first failure.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Length of every vector this provider returns.
    fn dimensions(&self) -> usize;
}

//! Data types for documents, chunks, stored entries, and search results.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A source document containing text content and metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    pub metadata: HashMap<String, String>,
    /// Optional URI pointing to the original source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

impl Document {
    /// Create a document with no metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), metadata: HashMap::new(), source_uri: None }
    }

    /// Derive a stable document identifier from a file path.
    ///
    /// Re-ingesting the same file produces the same id, so upserts overwrite
    /// the previous chunks instead of duplicating them. Existing paths are
    /// canonicalized first, so `./docs/a.pdf` and its absolute form agree.
    pub fn id_for_path(path: &Path) -> String {
        let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
        digest[..12].iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// A segment of a [`Document`] produced by a [`Chunker`](crate::Chunker).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier, `{document_id}_{index}`.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Position of this chunk within its document.
    pub index: usize,
    /// The text content of the chunk.
    pub text: String,
    /// Metadata inherited from the parent document plus `chunk_index`.
    pub metadata: HashMap<String, String>,
}

/// A chunk persisted in a vector store together with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorEntry {
    /// Unique identifier for the entry.
    pub id: String,
    /// The embedding. Backends may leave this empty on query results.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vector: Vec<f32>,
    /// The chunk text.
    pub text: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Key-value metadata.
    pub metadata: HashMap<String, String>,
}

impl VectorEntry {
    /// Attach an embedding to a chunk.
    pub fn from_chunk(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.id,
            vector,
            text: chunk.text,
            document_id: chunk.document_id,
            metadata: chunk.metadata,
        }
    }
}

/// A retrieved [`VectorEntry`] paired with a relevance score.
///
/// Serializes flat, so a result reads as a retrieved chunk with a `score`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved entry.
    #[serde(flatten)]
    pub entry: VectorEntry,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

/// Equality filter over entry metadata. An entry matches when every pair matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetadataFilter(pub HashMap<String, String>);

impl MetadataFilter {
    /// Create an empty filter that matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to equal `value`.
    pub fn equals(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Check whether the given metadata satisfies the filter.
    pub fn matches(&self, metadata: &HashMap<String, String>) -> bool {
        self.0.iter().all(|(k, v)| metadata.get(k) == Some(v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

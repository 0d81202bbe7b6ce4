//! # pdfchat-rag
//!
//! Document ingestion and retrieval-augmented question answering.
//!
//! ## Overview
//!
//! Two pipelines share one vector collection:
//!
//! - **Ingestion**: [`DirectoryLoader`] → [`Chunker`] → [`EmbeddingProvider`]
//!   → [`VectorStore`], orchestrated by [`RagPipeline::ingest_directory`].
//! - **Query**: [`QaChain`] embeds the question, retrieves the top-k chunks,
//!   renders a [`PromptTemplate`], and streams the answer from a
//!   [`LanguageModel`].
//!
//! Backends:
//!
//! - [`openai::OpenAIEmbeddingProvider`] and [`openai::OpenAIChatModel`] (feature `openai`)
//! - [`pinecone::PineconeVectorStore`] (feature `pinecone`)
//! - [`InMemoryVectorStore`] for tests and local runs
//! - [`mock::MockEmbeddingProvider`] and [`mock::MockLlm`] for offline use
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pdfchat_rag::*;
//!
//! let pipeline = Arc::new(
//!     RagPipeline::builder()
//!         .config(RagConfig::default())
//!         .embedding_provider(Arc::new(mock::MockEmbeddingProvider::new(64)))
//!         .vector_store(
//!             Arc::new(InMemoryVectorStore::new()),
//!             CollectionSpec::new("docs", 64, DistanceMetric::Cosine),
//!         )
//!         .build()?,
//! );
//! pipeline.ensure_collection().await?;
//! pipeline.ingest(&Document::new("france", "Paris is the capital of France.")).await?;
//!
//! let chain = QaChain::new(pipeline, Arc::new(mock::MockLlm::scripted(["Paris."])));
//! let answer = chain.invoke(RagInput::new("What is the capital of France?")).await?;
//! ```
//!
//! ## Features
//!
//! | Feature | Enables |
//! |---------|---------|
//! | `pdf` | [`PdfLoader`] |
//! | `openai` | the [`openai`] module |
//! | `pinecone` | the [`pinecone`] module |

pub mod chain;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod inmemory;
pub mod llm;
pub mod loader;
pub mod mock;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "pinecone")]
pub mod pinecone;
pub mod pipeline;
pub mod prompt;
pub mod retry;
pub mod vectorstore;

pub use chain::{Answer, AnswerStream, ChainState, QaChain, RagInput};
pub use chunking::{Chunker, RecursiveChunker};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{Chunk, Document, MetadataFilter, SearchResult, VectorEntry};
pub use embedding::EmbeddingProvider;
pub use error::{ErrorKind, RagError, Result};
pub use inmemory::InMemoryVectorStore;
pub use llm::{LanguageModel, TokenStream};
#[cfg(feature = "pdf")]
pub use loader::PdfLoader;
pub use loader::{DirectoryLoader, DocumentLoader, LoadPolicy, LoaderConfig, TextLoader};
pub use pipeline::{IngestReport, LoadFailure, RagPipeline, RagPipelineBuilder};
pub use prompt::{DEFAULT_TEMPLATE, PromptTemplate};
pub use retry::RetryPolicy;
pub use vectorstore::{
    CollectionHandle, CollectionSpec, DistanceMetric, FailedEntry, UpsertReport, VectorStore,
};

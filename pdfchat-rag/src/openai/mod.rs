//! OpenAI-backed embedding provider and chat model.
//!
//! This module is only available when the `openai` feature is enabled.

mod chat;
mod config;
mod embedding;

pub use chat::OpenAIChatModel;
pub use config::OpenAIConfig;
pub use embedding::OpenAIEmbeddingProvider;

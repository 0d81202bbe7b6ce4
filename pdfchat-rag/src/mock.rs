//! Deterministic stand-ins for the embedding service and the chat model.
//!
//! Used by tests and offline demos; nothing here makes network calls.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::llm::{LanguageModel, TokenStream};

/// Bag-of-words embeddings: each lowercase word is hashed into a bucket, and
/// the counts are L2-normalized.
///
/// Identical texts get identical vectors, and texts sharing words score higher
/// than unrelated ones.
#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    dimensions: usize,
    calls: Arc<AtomicUsize>,
}

impl MockEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1), calls: Arc::new(AtomicUsize::new(0)) }
    }

    /// Number of texts embedded so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
        {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            // Texts without words still need a valid unit vector.
            vector[0] = 1.0;
        } else {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector_for(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[derive(Debug, Clone)]
enum Behavior {
    Scripted(Vec<String>),
    Echo,
    Failing(String),
    FailAfter(Vec<String>, String),
    Stalled,
}

/// A [`LanguageModel`] with scripted output.
///
/// Every stream it opens counts towards [`close_count`](MockLlm::close_count)
/// once it is released, whether it finished, failed, or was dropped.
#[derive(Debug, Clone)]
pub struct MockLlm {
    behavior: Behavior,
    closes: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
    last_prompt: Arc<Mutex<Option<String>>>,
}

impl MockLlm {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            closes: Arc::new(AtomicUsize::new(0)),
            opened: Arc::new(AtomicUsize::new(0)),
            last_prompt: Arc::new(Mutex::new(None)),
        }
    }

    /// Yield `tokens` in order.
    pub fn scripted<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_behavior(Behavior::Scripted(tokens.into_iter().map(Into::into).collect()))
    }

    /// Yield the words of the prompt, each followed by a space.
    pub fn echo() -> Self {
        Self::with_behavior(Behavior::Echo)
    }

    /// Refuse to open a stream.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_behavior(Behavior::Failing(message.into()))
    }

    /// Yield `tokens`, then fail with `message`.
    pub fn failing_after<I, S>(tokens: I, message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_behavior(Behavior::FailAfter(
            tokens.into_iter().map(Into::into).collect(),
            message.into(),
        ))
    }

    /// Open a stream that never yields.
    pub fn stalled() -> Self {
        Self::with_behavior(Behavior::Stalled)
    }

    /// Number of streams released so far.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Number of streams opened so far.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// The prompt of the most recent call.
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().ok().and_then(|prompt| prompt.clone())
    }

    fn generation_error(message: &str) -> RagError {
        RagError::GenerationError { model: "mock".to_string(), message: message.to_string() }
    }
}

#[async_trait]
impl LanguageModel for MockLlm {
    fn name(&self) -> &str {
        "mock"
    }

    async fn stream(&self, prompt: &str) -> Result<TokenStream> {
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = Some(prompt.to_string());
        }

        let items: Vec<Result<String>> = match &self.behavior {
            Behavior::Failing(message) => return Err(Self::generation_error(message)),
            Behavior::Stalled => {
                self.opened.fetch_add(1, Ordering::SeqCst);
                let closes = self.closes.clone();
                return Ok(TokenStream::new(futures::stream::pending()).with_close_hook(
                    move || {
                        closes.fetch_add(1, Ordering::SeqCst);
                    },
                ));
            }
            Behavior::Scripted(tokens) => tokens.iter().cloned().map(Ok).collect(),
            Behavior::Echo => prompt.split_whitespace().map(|w| Ok(format!("{w} "))).collect(),
            Behavior::FailAfter(tokens, message) => tokens
                .iter()
                .cloned()
                .map(Ok)
                .chain(std::iter::once(Err(Self::generation_error(message))))
                .collect(),
        };

        self.opened.fetch_add(1, Ordering::SeqCst);
        let closes = self.closes.clone();
        Ok(TokenStream::new(futures::stream::iter(items)).with_close_hook(move || {
            closes.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

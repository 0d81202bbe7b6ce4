//! Retrieval-augmented question answering.
//!
//! [`QaChain`] runs an explicit state machine:
//!
//! ```text
//! AwaitingQuestion → Retrieving → Answering → Done
//!        │               │            │
//!        └───────────────┴────────────┴──→ Failed
//! ```
//!
//! [`QaChain::invoke`] drives it to a terminal state and returns the full
//! [`Answer`]. [`QaChain::stream`] stops after retrieval and hands back an
//! [`AnswerStream`] that yields tokens as the model produces them.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::document::SearchResult;
use crate::error::{RagError, Result};
use crate::llm::LanguageModel;
use crate::pipeline::RagPipeline;
use crate::prompt::PromptTemplate;
use crate::retry::with_timeout;

/// Input of the chain: a single-field record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RagInput {
    pub question: String,
}

impl RagInput {
    pub fn new(question: impl Into<String>) -> Self {
        Self { question: question.into() }
    }
}

/// Output of the chain: the generated answer and the chunks it was based on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub docs: Vec<SearchResult>,
}

/// The state of one chain execution.
#[derive(Debug)]
pub enum ChainState {
    AwaitingQuestion(String),
    Retrieving { question: String },
    Answering { question: String, docs: Vec<SearchResult> },
    Done(Answer),
    Failed(RagError),
}

impl ChainState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Failed(_))
    }

    /// Short state name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AwaitingQuestion(_) => "awaiting_question",
            Self::Retrieving { .. } => "retrieving",
            Self::Answering { .. } => "answering",
            Self::Done(_) => "done",
            Self::Failed(_) => "failed",
        }
    }
}

/// Reject empty or whitespace-only questions.
pub fn validate_question(question: &str) -> Result<String> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(RagError::ValidationError("question must not be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

/// Question-answering chain over a [`RagPipeline`] and a [`LanguageModel`].
///
/// The chain holds no per-request state; one instance serves concurrent
/// requests behind an `Arc`.
///
/// # Example
///
/// ```rust,ignore
/// let chain = QaChain::new(pipeline, Arc::new(model));
/// let answer = chain.invoke(RagInput::new("What is the capital of France?")).await?;
/// println!("{} ({} sources)", answer.answer, answer.docs.len());
/// ```
#[derive(Clone)]
pub struct QaChain {
    pipeline: Arc<RagPipeline>,
    model: Arc<dyn LanguageModel>,
    template: PromptTemplate,
    generation_timeout: Duration,
}

impl QaChain {
    /// Default limit for opening the stream and for each wait on a token.
    pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(pipeline: Arc<RagPipeline>, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            pipeline,
            model,
            template: PromptTemplate::default(),
            generation_timeout: Self::DEFAULT_GENERATION_TIMEOUT,
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    pub fn pipeline(&self) -> &Arc<RagPipeline> {
        &self.pipeline
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    /// Advance `state` by one transition. Terminal states are returned unchanged.
    pub async fn step(&self, state: ChainState) -> ChainState {
        let from = state.name();
        let next = match state {
            ChainState::AwaitingQuestion(question) => match validate_question(&question) {
                Ok(question) => ChainState::Retrieving { question },
                Err(e) => ChainState::Failed(e),
            },
            ChainState::Retrieving { question } => {
                match self.pipeline.retrieve(&question, None).await {
                    Ok(docs) => {
                        if docs.is_empty() {
                            warn!("no context retrieved, answering without it");
                        }
                        ChainState::Answering { question, docs }
                    }
                    Err(e) => ChainState::Failed(e),
                }
            }
            ChainState::Answering { question, docs } => {
                match self.generate(&question, docs).await {
                    Ok(stream) => match stream.collect_answer().await {
                        Ok(answer) => ChainState::Done(answer),
                        Err(e) => ChainState::Failed(e),
                    },
                    Err(e) => ChainState::Failed(e),
                }
            }
            terminal => terminal,
        };
        debug!(from, to = next.name(), "chain transition");
        next
    }

    /// Run the chain to completion.
    ///
    /// # Errors
    ///
    /// Returns the error that moved the chain into [`ChainState::Failed`];
    /// no partial answer is returned.
    pub async fn invoke(&self, input: RagInput) -> Result<Answer> {
        let mut state = ChainState::AwaitingQuestion(input.question);
        loop {
            state = self.step(state).await;
            match state {
                ChainState::Done(answer) => {
                    info!(docs = answer.docs.len(), chars = answer.answer.len(), "answered question");
                    return Ok(answer);
                }
                ChainState::Failed(e) => {
                    warn!(kind = %e.kind(), error = %e, "chain failed");
                    return Err(e);
                }
                _ => {}
            }
        }
    }

    /// Validate and retrieve, then return a token stream for the answer.
    ///
    /// # Errors
    ///
    /// Fails before any token is produced if validation, retrieval, or opening
    /// the model stream fails. Errors after that arrive as stream items.
    pub async fn stream(&self, input: RagInput) -> Result<AnswerStream> {
        let mut state = ChainState::AwaitingQuestion(input.question);
        loop {
            state = match state {
                ChainState::Answering { question, docs } => {
                    return self.generate(&question, docs).await;
                }
                ChainState::Failed(e) => return Err(e),
                ChainState::Done(_) => {
                    return Err(RagError::ValidationError("chain already finished".to_string()));
                }
                other => self.step(other).await,
            };
        }
    }

    /// Render the prompt and open the model stream.
    async fn generate(&self, question: &str, docs: Vec<SearchResult>) -> Result<AnswerStream> {
        let prompt = self.template.render_with_docs(&docs, question);
        debug!(model = self.model.name(), prompt_chars = prompt.len(), "opening generation stream");

        let limit = self.generation_timeout;
        let tokens = with_timeout("generation", limit, self.model.stream(&prompt)).await?;

        let bounded = async_stream::stream! {
            let mut tokens = tokens;
            loop {
                match tokio::time::timeout(limit, tokens.next()).await {
                    Ok(Some(item)) => yield item,
                    Ok(None) => break,
                    Err(_) => {
                        tokens.close();
                        let operation = "generation".to_string();
                        yield Err(RagError::TimeoutError { operation, after: limit });
                        break;
                    }
                }
            }
        };

        Ok(AnswerStream { docs, tokens: bounded.boxed(), answer: String::new(), done: false })
    }
}

impl fmt::Debug for QaChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QaChain")
            .field("model", &self.model.name())
            .field("collection", self.pipeline.collection().spec())
            .field("generation_timeout", &self.generation_timeout)
            .finish()
    }
}

/// A streamed answer.
///
/// The retrieved chunks are available immediately through
/// [`docs`](AnswerStream::docs); tokens are pulled with the [`Stream`]
/// implementation or [`next_token`](AnswerStream::next_token). Dropping the
/// stream, or calling [`cancel`](AnswerStream::cancel), releases the model
/// connection. The stream ends after the first error.
pub struct AnswerStream {
    docs: Vec<SearchResult>,
    tokens: BoxStream<'static, Result<String>>,
    answer: String,
    done: bool,
}

impl AnswerStream {
    pub fn docs(&self) -> &[SearchResult] {
        &self.docs
    }

    /// The text received so far.
    pub fn partial_answer(&self) -> &str {
        &self.answer
    }

    pub async fn next_token(&mut self) -> Option<Result<String>> {
        self.next().await
    }

    /// Stop generation and release the connection.
    pub fn cancel(self) {
        drop(self);
    }

    /// Drain the stream into an [`Answer`]. Fails without a partial answer if
    /// any token fails.
    pub async fn collect_answer(mut self) -> Result<Answer> {
        while let Some(token) = self.next().await {
            token?;
        }
        Ok(Answer { answer: self.answer, docs: self.docs })
    }
}

impl Stream for AnswerStream {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match this.tokens.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(token))) => {
                this.answer.push_str(&token);
                Poll::Ready(Some(Ok(token)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl fmt::Debug for AnswerStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnswerStream")
            .field("docs", &self.docs.len())
            .field("answer", &self.answer)
            .field("done", &self.done)
            .finish()
    }
}

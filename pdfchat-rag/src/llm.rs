//! Language model trait and the token stream it produces.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use futures::stream::BoxStream;

use crate::error::Result;

/// A chat model that answers a rendered prompt with a stream of tokens.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, used in logs and errors.
    fn name(&self) -> &str;

    /// Start generating an answer for `prompt`.
    async fn stream(&self, prompt: &str) -> Result<TokenStream>;
}

type CloseHook = Box<dyn FnOnce() + Send>;

/// A finite, non-restartable stream of generated tokens.
///
/// The stream owns the underlying connection. It is released when the stream
/// ends, when [`close`](TokenStream::close) is called, or when the stream is
/// dropped mid-way; the close hook runs exactly once in all three cases.
pub struct TokenStream {
    inner: Option<BoxStream<'static, Result<String>>>,
    on_close: Option<CloseHook>,
}

impl TokenStream {
    pub fn new(inner: impl Stream<Item = Result<String>> + Send + 'static) -> Self {
        Self { inner: Some(Box::pin(inner)), on_close: None }
    }

    /// Run `hook` when the stream is released.
    pub fn with_close_hook(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }

    /// Release the underlying stream. Further polls yield `None`.
    pub fn close(&mut self) {
        self.inner.take();
        if let Some(hook) = self.on_close.take() {
            hook();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl Stream for TokenStream {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };
        match inner.as_mut().poll_next(cx) {
            Poll::Ready(None) => {
                this.close();
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl Drop for TokenStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for TokenStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStream").field("closed", &self.is_closed()).finish()
    }
}

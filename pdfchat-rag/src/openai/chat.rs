use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig as AsyncOpenAIConfig;
use async_openai::types::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use tracing::debug;

use super::config::OpenAIConfig;
use crate::error::{RagError, Result};
use crate::llm::{LanguageModel, TokenStream};
use crate::retry::with_timeout;

/// A [`LanguageModel`] backed by OpenAI chat completions, always streamed.
pub struct OpenAIChatModel {
    client: Client<AsyncOpenAIConfig>,
    model: String,
    temperature: f32,
    first_token_timeout: Duration,
}

impl OpenAIChatModel {
    pub fn new(config: &OpenAIConfig) -> Self {
        let openai_config = AsyncOpenAIConfig::new()
            .with_api_key(&config.api_key)
            .with_api_base(config.api_base());

        Self {
            client: Client::with_config(openai_config),
            model: config.chat_model.clone(),
            temperature: config.temperature,
            first_token_timeout: config.request_timeout,
        }
    }

    fn error(&self, message: String) -> RagError {
        RagError::GenerationError { model: self.model.clone(), message }
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn stream(&self, prompt: &str) -> Result<TokenStream> {
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| self.error(format!("failed to build message: {e}")))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .messages(vec![message.into()])
            .build()
            .map_err(|e| self.error(format!("failed to build request: {e}")))?;

        let mut chunks = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| self.error(format!("OpenAI API error: {e}")))?;

        let model = self.model.clone();
        let first_token_timeout = self.first_token_timeout;
        let tokens = try_stream! {
            let mut next = with_timeout("openai.chat", first_token_timeout, async {
                Ok(chunks.next().await)
            })
            .await?;
            while let Some(chunk) = next {
                let chunk = chunk.map_err(|e| RagError::GenerationError {
                    model: model.clone(),
                    message: format!("stream error: {e}"),
                })?;
                for choice in chunk.choices {
                    if let Some(content) = choice.delta.content {
                        if !content.is_empty() {
                            yield content;
                        }
                    }
                }
                next = chunks.next().await;
            }
        };

        let model = self.model.clone();
        Ok(TokenStream::new(tokens).with_close_hook(move || {
            debug!(model = %model, "chat stream released");
        }))
    }
}

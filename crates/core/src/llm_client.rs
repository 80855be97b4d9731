use crate::error::ChatError;
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{ChatCompletionRequestMessage, CreateChatCompletionRequest, CreateChatCompletionRequestArgs},
};
use async_trait::async_trait;
use futures::{Stream, StreamExt, stream};
use serde_json::Value;
use std::pin::Pin;
use std::time::Duration;
use tracing::warn;

/// A stream of text deltas, in arrival order.
pub type LLMStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

/// Sampling parameters sent with every completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_tokens: 200,
            temperature: 0.8,
            top_p: 0.9,
            frequency_penalty: 0.1,
            presence_penalty: 0.1,
        }
    }
}

/// A generic client for interacting with a chat-completion LLM.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Makes a single, non-streaming call and returns the reply text.
    async fn complete(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<String, ChatError>;

    /// Makes a streaming call; the returned stream yields content deltas.
    async fn stream(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<LLMStream, ChatError>;
}

/// An implementation of `LLMClient` for any OpenAI-compatible API (DeepSeek by default).
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
    sampling: SamplingParams,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The model identifier to use for chat completions (e.g., "deepseek-chat").
    /// * `sampling` - Sampling parameters applied to every request.
    pub fn new(config: OpenAIConfig, model: String, sampling: SamplingParams) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            sampling,
        }
    }

    fn request(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        stream: bool,
    ) -> Result<CreateChatCompletionRequest, ChatError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(messages)
            .max_tokens(self.sampling.max_tokens)
            .temperature(self.sampling.temperature)
            .top_p(self.sampling.top_p)
            .frequency_penalty(self.sampling.frequency_penalty)
            .presence_penalty(self.sampling.presence_penalty);
        if stream {
            args.stream(true);
        }
        Ok(args.build()?)
    }
}

/// Text of `choices[0].delta.content` in a stream chunk, if non-empty.
///
/// Chunks are read loosely so that endpoints sending only this field work.
fn delta_content(chunk: &Value) -> Option<String> {
    chunk["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|content| !content.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl LLMClient for OpenAICompatibleClient {
    async fn complete(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<String, ChatError> {
        let request = self.request(messages, false)?;
        let response: Value = self.client.chat().create_byot(request).await?;

        response["choices"][0]["message"]["content"]
            .as_str()
            .map(|content| content.trim().to_string())
            .ok_or_else(|| ChatError::MalformedResponse("no content in completion".to_string()))
    }

    async fn stream(&self, messages: Vec<ChatCompletionRequestMessage>) -> Result<LLMStream, ChatError> {
        let request = self.request(messages, true)?;
        let stream = self
            .client
            .chat()
            .create_stream_byot::<CreateChatCompletionRequest, Value>(request)
            .await?;

        Ok(Box::pin(stream.filter_map(|result| async move {
            match result {
                Ok(chunk) => delta_content(&chunk).map(Ok),
                Err(e @ OpenAIError::JSONDeserialize(..)) => {
                    warn!(error = %e, "Skipping unparsable stream chunk");
                    None
                }
                Err(e) => Some(Err(ChatError::from(e))),
            }
        })))
    }
}

/// Splits `text` into slices of `slice_chars` characters.
pub fn slice_text(text: &str, slice_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(slice_chars.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Emits a locally produced reply as an [`LLMStream`] with a fixed cadence.
///
/// The first slice is delayed like every other one, so consumers see the same
/// suspension points they would see on a network stream.
pub fn simulated_stream(text: &str, slice_chars: usize, cadence: Duration) -> LLMStream {
    Box::pin(stream::iter(slice_text(text, slice_chars)).then(move |slice| async move {
        tokio::time::sleep(cadence).await;
        Ok(slice)
    }))
}

//! OpenAI provider implementation
//!
//! Works against any OpenAI-compatible `chat/completions` endpoint. Streaming
//! uses server-sent events and ends on the `[DONE]` sentinel or when the
//! server closes the body.

use crate::llm::provider::{
    CompletionRequest, CompletionResponse, CompletionStream, FinishReason, LlmError, LlmProvider,
    Message, MessageRole, StreamDelta, TokenUsage,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, error, warn};

/// OpenAI provider configuration
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    /// Connect timeout for every call, and total timeout for batched calls
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// OpenAI provider implementation
pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::NotConfigured(
                "OpenAI API key is required".to_string(),
            ));
        }

        // No total timeout on the client: it would also cap streamed bodies.
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Estimate token count for messages (pure function)
    fn estimate_token_count(messages: &[OpenAiMessage]) -> usize {
        messages.iter().map(|m| m.content.len() / 4).sum()
    }

    /// Convert completion request to OpenAI format (pure function)
    fn convert_to_openai_request(request: &CompletionRequest, stream: bool) -> OpenAiCompletionRequest {
        OpenAiCompletionRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(Self::convert_message).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: stream.then_some(true),
        }
    }

    /// Parse OpenAI completion response (pure function)
    fn parse_completion_response(
        openai_response: OpenAiCompletionResponse,
    ) -> Result<CompletionResponse, LlmError> {
        let choice = openai_response
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::NoChoices)?;

        Ok(CompletionResponse {
            content: choice.message.content,
            model: openai_response.model,
            usage: TokenUsage {
                prompt_tokens: openai_response.usage.prompt_tokens,
                completion_tokens: openai_response.usage.completion_tokens,
                total_tokens: openai_response.usage.total_tokens,
            },
            finish_reason: Self::convert_finish_reason_pure(choice.finish_reason.as_deref()),
        })
    }

    /// Convert OpenAI finish reason to internal format (pure function)
    fn convert_finish_reason_pure(reason: Option<&str>) -> FinishReason {
        match reason {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Error,
        }
    }

    /// Convert internal message to OpenAI format
    fn convert_message(message: &Message) -> OpenAiMessage {
        OpenAiMessage {
            role: match message.role {
                MessageRole::System => "system".to_string(),
                MessageRole::User => "user".to_string(),
                MessageRole::Assistant => "assistant".to_string(),
            },
            content: message.content.clone(),
        }
    }

    /// Log request information (impure)
    fn log_request_info(&self, request: &OpenAiCompletionRequest) {
        debug!(
            model = %request.model,
            stream = request.stream.unwrap_or(false),
            "OpenAI request: {} messages, estimated ~{} tokens",
            request.messages.len(),
            Self::estimate_token_count(&request.messages)
        );
    }

    /// Send a single request and map HTTP-level failures (impure I/O)
    async fn send_request(
        &self,
        openai_request: &OpenAiCompletionRequest,
        total_timeout: Option<Duration>,
    ) -> Result<reqwest::Response, LlmError> {
        self.log_request_info(openai_request);

        let mut builder = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(openai_request);
        if let Some(timeout) = total_timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            let error_msg = format!(
                "HTTP request failed: {} (is_connect: {}, is_timeout: {}, is_request: {})",
                e,
                e.is_connect(),
                e.is_timeout(),
                e.is_request()
            );
            warn!("OpenAI network error details: {}", error_msg);
            LlmError::NetworkError(error_msg)
        })?;

        let status = response.status();

        if status.is_server_error() {
            let error_text = response.text().await.unwrap_or_default();
            let error_msg = format!("OpenAI API server error: {status} - {error_text}");
            warn!("OpenAI server error: {}", error_msg);
            return Err(LlmError::ApiError(error_msg));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(
                "OpenAI API client error - Status: {}, Response: {}",
                status, error_text
            );
            return Err(LlmError::ApiError(format!(
                "OpenAI API error: {status} - {error_text}"
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let openai_request = Self::convert_to_openai_request(&request, false);

        let openai_response: OpenAiCompletionResponse = self
            .send_request(&openai_request, Some(self.config.timeout))
            .await?
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let response = Self::parse_completion_response(openai_response)?;
        debug!(
            "OpenAI response: {} tokens used (prompt: {}, completion: {}), finish_reason: {:?}",
            response.usage.total_tokens,
            response.usage.prompt_tokens,
            response.usage.completion_tokens,
            response.finish_reason,
        );
        Ok(response)
    }

    async fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, LlmError> {
        let openai_request = Self::convert_to_openai_request(&request, true);
        let response = self.send_request(&openai_request, None).await?;

        Ok(parse_sse_stream(response.bytes_stream().boxed()))
    }
}

/// Result of interpreting one SSE line
#[derive(Debug, PartialEq)]
enum SseEvent {
    Delta(StreamDelta),
    Done,
    Ignore,
}

/// Interpret one complete SSE line (pure function)
fn parse_sse_line(line: &str) -> Result<SseEvent, LlmError> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        // Blank separators, comments (":") and "event:"/"id:" fields carry no content.
        return Ok(SseEvent::Ignore);
    };

    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }
    if data.is_empty() {
        return Ok(SseEvent::Ignore);
    }

    let chunk: OpenAiStreamChunk =
        serde_json::from_str(data).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

    if let Some(api_error) = chunk.error {
        return Err(LlmError::ApiError(api_error.message));
    }

    let delta = chunk
        .choices
        .into_iter()
        .next()
        .map(|choice| StreamDelta {
            content: choice.delta.content.unwrap_or_default(),
            finish_reason: choice
                .finish_reason
                .as_deref()
                .map(|r| OpenAiProvider::convert_finish_reason_pure(Some(r))),
        })
        .unwrap_or_default();

    Ok(SseEvent::Delta(delta))
}

struct SseState {
    bytes: BoxStream<'static, reqwest::Result<Bytes>>,
    buffer: Vec<u8>,
    pending: VecDeque<StreamDelta>,
    /// Emitted once every delta queued ahead of it has been yielded
    error: Option<LlmError>,
    finished: bool,
}

impl SseState {
    /// Consume one line from the byte buffer, queueing any delta it carries
    fn consume_line(&mut self, line: &[u8]) -> Result<(), LlmError> {
        match parse_sse_line(&String::from_utf8_lossy(line))? {
            SseEvent::Delta(delta) => self.pending.push_back(delta),
            SseEvent::Done => self.finished = true,
            SseEvent::Ignore => {}
        }
        Ok(())
    }

    /// Drain every complete line currently buffered
    fn drain_lines(&mut self) -> Result<(), LlmError> {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.consume_line(&line)?;
            if self.finished {
                self.buffer.clear();
                break;
            }
        }
        Ok(())
    }
}

/// Turn a raw SSE byte stream into completion increments
///
/// Lines are split on raw bytes before decoding so multi-byte characters that
/// straddle network chunks survive intact.
fn parse_sse_stream(bytes: BoxStream<'static, reqwest::Result<Bytes>>) -> CompletionStream {
    let state = SseState {
        bytes,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        error: None,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(delta) = state.pending.pop_front() {
                return Some((Ok(delta), state));
            }
            if let Some(e) = state.error.take() {
                return Some((Err(e), state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(&chunk);
                    if let Err(e) = state.drain_lines() {
                        state.finished = true;
                        state.error = Some(e);
                    }
                }
                Some(Err(e)) => {
                    state.finished = true;
                    state.error = Some(LlmError::StreamInterrupted(e.to_string()));
                }
                None => {
                    state.finished = true;
                    let tail = std::mem::take(&mut state.buffer);
                    if let Err(e) = state.consume_line(&tail) {
                        state.error = Some(e);
                    }
                }
            }
        }
    })
    .boxed()
}

#[derive(Debug, Serialize)]
struct OpenAiCompletionRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiCompletionResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: OpenAiUsage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    error: Option<OpenAiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    message: String,
}

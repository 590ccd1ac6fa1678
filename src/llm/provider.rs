//! LLM provider abstraction and trait definitions
//!
//! This module defines the core traits and types for model backend interactions:
//! a single batched completion and an incrementally streamed completion.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// Message roles in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// LLM completion request parameters
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// Request pairing a system prompt with raw user text
    pub fn with_system_prompt(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        user_text: impl Into<String>,
    ) -> Self {
        Self {
            messages: vec![
                Message {
                    role: MessageRole::System,
                    content: system_prompt.into(),
                },
                Message {
                    role: MessageRole::User,
                    content: user_text.into(),
                },
            ],
            model: model.into(),
            max_tokens: None,
            temperature: None,
        }
    }

    /// Content of the system message, if any
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
    }
}

/// LLM completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: Option<String>,
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: FinishReason,
}

/// Token usage statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason why completion finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Error,
}

/// One increment of a streamed completion
///
/// `content` may be empty: providers forward keep-alive and role-only chunks
/// as-is and leave skipping them to the consumer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamDelta {
    pub content: String,
    pub finish_reason: Option<FinishReason>,
}

impl StreamDelta {
    pub fn text<S: Into<String>>(content: S) -> Self {
        Self {
            content: content.into(),
            finish_reason: None,
        }
    }
}

/// Stream of completion increments; `None` marks a clean end of stream
pub type CompletionStream = BoxStream<'static, Result<StreamDelta, LlmError>>;

/// LLM provider trait for dependency injection and testing
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "openai")
    fn name(&self) -> &str;

    /// Generate a completion from the given request
    ///
    /// Fails with [`LlmError::NoChoices`] when the backend answers without any choice.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Open a streamed completion for the given request
    ///
    /// Dropping the returned stream closes the underlying connection.
    async fn complete_stream(&self, request: CompletionRequest)
        -> Result<CompletionStream, LlmError>;
}

/// LLM provider errors
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("no choices in model response")]
    NoChoices,
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),
}

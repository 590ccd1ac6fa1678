//! Mock implementations for testing
//!
//! Provides mock LlmProvider, TaskHandle and VoiceBackend implementations so
//! the pipeline can be exercised without a model backend, a task runtime or a
//! voice service.

use crate::llm::provider::{
    CompletionRequest, CompletionResponse, CompletionStream, FinishReason, LlmError, LlmProvider,
    StreamDelta, TokenUsage,
};
use crate::persona::Intent;
use crate::protocol::{Artifact, Message, TaskState};
use crate::task::{ReportingError, TaskHandle};
use crate::voice::{VoiceBackend, VoiceError};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Mock LLM provider for testing
///
/// Batched calls walk through `responses` in order, wrapping around. Streamed
/// calls replay `stream_script`.
#[derive(Debug)]
pub struct MockLlmProvider {
    pub responses: Vec<Result<String, LlmError>>,
    pub current_response: Arc<Mutex<usize>>,
    pub stream_script: Vec<Result<StreamDelta, LlmError>>,
    pub stream_open_error: Option<LlmError>,
    /// Keep the stream open forever after the script is exhausted
    pub stream_hangs: bool,
    pub complete_requests: Arc<Mutex<Vec<CompletionRequest>>>,
    pub stream_requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockLlmProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    /// Batched calls return each scripted result in turn
    pub fn scripted(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses,
            current_response: Arc::new(Mutex::new(0)),
            stream_script: Vec::new(),
            stream_open_error: None,
            stream_hangs: false,
            complete_requests: Arc::new(Mutex::new(Vec::new())),
            stream_requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_failure() -> Self {
        Self::scripted(vec![Err(LlmError::NetworkError(
            "Mock LLM failure".to_string(),
        ))])
    }

    pub fn single_response(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Classifier answers `label`; the streamed reply yields `chunks`
    pub fn streaming(label: impl Into<String>, chunks: Vec<&str>) -> Self {
        Self::single_response(label).with_stream(chunks)
    }

    pub fn with_stream(mut self, chunks: Vec<&str>) -> Self {
        self.stream_script = chunks
            .into_iter()
            .map(|c| Ok(StreamDelta::text(c)))
            .collect();
        self
    }

    pub fn with_stream_script(mut self, script: Vec<Result<StreamDelta, LlmError>>) -> Self {
        self.stream_script = script;
        self
    }

    pub fn with_stream_open_error(mut self, error: LlmError) -> Self {
        self.stream_open_error = Some(error);
        self
    }

    pub fn hanging_after_script(mut self) -> Self {
        self.stream_hangs = true;
        self
    }

    pub async fn get_complete_requests(&self) -> Vec<CompletionRequest> {
        self.complete_requests.lock().await.clone()
    }

    pub async fn get_stream_requests(&self) -> Vec<CompletionRequest> {
        self.stream_requests.lock().await.clone()
    }

    /// Total number of model calls of either kind
    pub async fn call_count(&self) -> usize {
        self.complete_requests.lock().await.len() + self.stream_requests.lock().await.len()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.complete_requests.lock().await.push(request);

        let mut current = self.current_response.lock().await;
        let response_idx = *current % self.responses.len().max(1);
        *current += 1;

        let content = match self.responses.get(response_idx) {
            Some(Ok(content)) => content.clone(),
            Some(Err(e)) => return Err(e.clone()),
            None => "Mock response".to_string(),
        };

        Ok(CompletionResponse {
            content: Some(content),
            model: "mock-model".to_string(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            finish_reason: FinishReason::Stop,
        })
    }

    async fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, LlmError> {
        self.stream_requests.lock().await.push(request);

        if let Some(error) = &self.stream_open_error {
            return Err(error.clone());
        }

        let script = stream::iter(self.stream_script.clone());
        if self.stream_hangs {
            Ok(script.chain(stream::pending()).boxed())
        } else {
            Ok(script.boxed())
        }
    }
}

/// Mock task handle recording every status update and artifact
#[derive(Debug, Default)]
pub struct MockTaskHandle {
    pub streaming: bool,
    pub statuses: Arc<Mutex<Vec<(TaskState, Option<Message>)>>>,
    pub artifacts: Arc<Mutex<Vec<Artifact>>>,
    pub fail_status_updates: bool,
    pub fail_artifacts: bool,
    /// Cancel the token once this many artifacts have been accepted
    pub cancel_after_artifacts: Option<(usize, CancellationToken)>,
}

impl MockTaskHandle {
    pub fn new(streaming: bool) -> Self {
        Self {
            streaming,
            ..Default::default()
        }
    }

    /// Handle whose status updates and artifact appends all fail
    pub fn with_failure(streaming: bool) -> Self {
        Self {
            streaming,
            fail_status_updates: true,
            fail_artifacts: true,
            ..Default::default()
        }
    }

    pub fn cancel_after(mut self, artifacts: usize, token: CancellationToken) -> Self {
        self.cancel_after_artifacts = Some((artifacts, token));
        self
    }

    pub async fn get_statuses(&self) -> Vec<(TaskState, Option<Message>)> {
        self.statuses.lock().await.clone()
    }

    pub async fn get_states(&self) -> Vec<TaskState> {
        self.statuses.lock().await.iter().map(|(s, _)| *s).collect()
    }

    pub async fn get_artifacts(&self) -> Vec<Artifact> {
        self.artifacts.lock().await.clone()
    }

    /// Last state reported, i.e. the task's current state as the runtime sees it
    pub async fn final_state(&self) -> Option<TaskState> {
        self.statuses.lock().await.last().map(|(s, _)| *s)
    }

    /// Text of the message attached to the last status update
    pub async fn final_message_text(&self) -> Option<String> {
        self.statuses
            .lock()
            .await
            .last()
            .and_then(|(_, m)| m.as_ref())
            .and_then(|m| m.first_text().map(str::to_string))
    }
}

#[async_trait]
impl TaskHandle for MockTaskHandle {
    fn is_streaming_request(&self) -> bool {
        self.streaming
    }

    async fn update_status(
        &self,
        state: TaskState,
        message: Option<Message>,
    ) -> Result<(), ReportingError> {
        // Recorded even when failing, so tests can see what was attempted.
        self.statuses.lock().await.push((state, message));
        if self.fail_status_updates {
            return Err(ReportingError::StatusRejected(
                "Mock status failure".to_string(),
            ));
        }
        Ok(())
    }

    async fn add_artifact(&self, artifact: Artifact) -> Result<(), ReportingError> {
        let mut artifacts = self.artifacts.lock().await;
        artifacts.push(artifact);

        if let Some((limit, token)) = &self.cancel_after_artifacts {
            if artifacts.len() >= *limit {
                token.cancel();
            }
        }

        if self.fail_artifacts {
            return Err(ReportingError::ArtifactRejected(
                "Mock artifact failure".to_string(),
            ));
        }
        Ok(())
    }
}

/// Mock voice backend recording every update request
#[derive(Debug, Default)]
pub struct MockVoiceBackend {
    pub calls: Arc<Mutex<Vec<(String, Intent)>>>,
    pub should_fail: bool,
}

impl MockVoiceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub async fn get_calls(&self) -> Vec<(String, Intent)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl VoiceBackend for MockVoiceBackend {
    async fn set_voice(&self, task_id: &str, intent: Intent) -> Result<(), VoiceError> {
        self.calls.lock().await.push((task_id.to_string(), intent));
        if self.should_fail {
            return Err(VoiceError::ApiError {
                code: "FailedOperation".to_string(),
                message: "Mock voice failure".to_string(),
            });
        }
        Ok(())
    }
}

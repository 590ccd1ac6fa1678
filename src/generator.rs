//! Response generation
//!
//! Runs the persona-specific model call, either as one batched completion or
//! as a stream of increments turned into an ordered run of artifacts.

use crate::classifier::IntentClassifier;
use crate::error::{AgentError, AgentResult};
use crate::llm::provider::{CompletionRequest, LlmProvider};
use crate::persona::{Intent, PersonaRegistry};
use crate::protocol::{Artifact, Message, TaskState};
use crate::task::TaskHandle;
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reply produced by the batched path
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedReply {
    pub intent: Intent,
    pub content: String,
}

/// Totals of a stream that ran to its end
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSummary {
    pub intent: Intent,
    /// Number of non-empty increments, each emitted as one content artifact
    pub chunks: usize,
    /// Byte length of the accumulated reply
    pub total_length: usize,
    pub time_to_first_token: Option<Duration>,
}

pub struct ResponseGenerator {
    provider: Arc<dyn LlmProvider>,
    model: String,
    classifier: IntentClassifier,
    personas: PersonaRegistry,
}

impl ResponseGenerator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        classifier: IntentClassifier,
        personas: PersonaRegistry,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            classifier,
            personas,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn persona_request(&self, text: &str, task_id: &str) -> AgentResult<(Intent, CompletionRequest)> {
        let decision = self.classifier.classify(text, task_id).await?;
        let system_prompt = self.personas.system_prompt(decision.intent)?;

        info!(task_id = %task_id, intent = %decision.intent, "Selected persona");

        Ok((
            decision.intent,
            CompletionRequest::with_system_prompt(self.model.as_str(), system_prompt, text),
        ))
    }

    /// Classify, then fetch the whole reply in one call
    pub async fn generate(&self, text: &str, task_id: &str) -> AgentResult<GeneratedReply> {
        let (intent, request) = self.persona_request(text, task_id).await?;

        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| AgentError::generation(e.to_string()))?;

        let content = response.content.unwrap_or_default();
        info!(
            task_id = %task_id,
            intent = %intent,
            response_length = content.len(),
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            "Model response received"
        );

        Ok(GeneratedReply { intent, content })
    }

    /// Classify, then stream the reply into `handle` as artifacts
    ///
    /// Each non-empty increment produces a working status carrying the
    /// increment and one content artifact. A run of at least one chunk ends
    /// with a closing artifact. Reporting failures are logged and skipped.
    /// The caller owns the terminal status transition.
    pub async fn stream(
        &self,
        text: &str,
        task_id: &str,
        handle: &dyn TaskHandle,
        cancel: &CancellationToken,
    ) -> AgentResult<StreamSummary> {
        let (intent, request) = self.persona_request(text, task_id).await?;

        let mut stream = self
            .provider
            .complete_stream(request)
            .await
            .map_err(|e| AgentError::generation(format!("failed to open stream: {e}")))?;

        let started = Instant::now();
        let mut time_to_first_token = None;
        let mut full_response = String::new();
        let mut chunk_index = 0usize;

        loop {
            // A pending cancel always wins over a ready increment.
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(task_id = %task_id, chunks = chunk_index, "Streaming canceled");
                    return Err(AgentError::canceled(format!(
                        "canceled after {chunk_index} chunks"
                    )));
                }
                next = stream.next() => next,
            };

            let delta = match next {
                None => break,
                Some(Ok(delta)) => delta,
                Some(Err(e)) => {
                    return Err(AgentError::generation(format!("stream receive error: {e}")));
                }
            };

            if delta.content.is_empty() {
                continue;
            }

            if time_to_first_token.is_none() {
                let elapsed = started.elapsed();
                info!(
                    task_id = %task_id,
                    ttft_ms = elapsed.as_millis() as u64,
                    "Time to first token"
                );
                time_to_first_token = Some(elapsed);
            }

            full_response.push_str(&delta.content);
            debug!(
                task_id = %task_id,
                chunk_index = chunk_index,
                chunk_size = delta.content.len(),
                total_length = full_response.len(),
                "Received stream chunk"
            );

            if let Err(e) = handle
                .update_status(TaskState::Working, Some(Message::agent_text(delta.content.as_str())))
                .await
            {
                warn!(task_id = %task_id, chunk_index = chunk_index, error = %e, "Failed to send chunk status");
            }

            let artifact = Artifact::stream_chunk(
                chunk_index,
                &delta.content,
                full_response.len(),
                &self.model,
            );
            if let Err(e) = handle.add_artifact(artifact).await {
                warn!(task_id = %task_id, chunk_index = chunk_index, error = %e, "Failed to add chunk artifact");
            }

            chunk_index += 1;
        }

        if chunk_index > 0 {
            let closing = Artifact::closing_chunk(chunk_index, full_response.len(), &self.model);
            if let Err(e) = handle.add_artifact(closing).await {
                warn!(task_id = %task_id, error = %e, "Failed to add closing artifact");
            }
        }

        info!(
            task_id = %task_id,
            intent = %intent,
            chunks = chunk_index,
            total_length = full_response.len(),
            "Streaming finished"
        );

        Ok(StreamSummary {
            intent,
            chunks: chunk_index,
            total_length: full_response.len(),
            time_to_first_token,
        })
    }
}

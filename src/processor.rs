//! Task lifecycle driver
//!
//! Drives one task from the incoming message to a terminal state:
//!
//! ```text
//! validating ──empty text──────────────▶ failed
//!     │
//!     ▼
//! working ──classification/generation──▶ failed
//!     │  ──cancel observed mid-stream──▶ canceled
//!     ▼
//! completed
//! ```
//!
//! Status updates and artifact appends are reported through the
//! [`TaskHandle`]; a rejected report is logged and never changes the outcome.

use crate::classifier::IntentClassifier;
use crate::error::{AgentError, AgentResult};
use crate::generator::ResponseGenerator;
use crate::llm::provider::LlmProvider;
use crate::persona::PersonaRegistry;
use crate::protocol::{extract_text, Artifact, Message, TaskState};
use crate::task::TaskHandle;
use crate::voice::VoiceNotifier;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

pub const EMPTY_INPUT_MESSAGE: &str = "input message must contain text";
pub const STREAMING_START_MESSAGE: &str = "Starting to process your streaming data...";
pub const BATCH_START_MESSAGE: &str = "Processing your text...";
pub const BATCH_COMPLETE_MESSAGE: &str = "Processing complete. Model response received.";

/// Completion message for a stream of `chunks` increments
pub fn streaming_complete_message(chunks: usize) -> String {
    format!("Processing complete. Received {chunks} chunks.")
}

/// Runs tasks through validation, classification and generation
pub struct TaskProcessor {
    generator: ResponseGenerator,
}

impl TaskProcessor {
    pub fn new(generator: ResponseGenerator) -> Self {
        Self { generator }
    }

    /// Wire a processor from its collaborators
    ///
    /// Classification and generation share `provider` and `model`.
    pub fn from_parts(
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        personas: PersonaRegistry,
        voice: VoiceNotifier,
    ) -> Self {
        let model = model.into();
        let classifier = IntentClassifier::new(provider.clone(), model.as_str(), voice);
        Self::new(ResponseGenerator::new(provider, model, classifier, personas))
    }

    /// Process one task to a terminal state
    ///
    /// Returns an error exactly when the task ends failed or canceled.
    pub async fn process(
        &self,
        task_id: &str,
        message: &Message,
        handle: &dyn TaskHandle,
        cancel: &CancellationToken,
    ) -> AgentResult<()> {
        let streaming = handle.is_streaming_request();
        let span = crate::task_span!(task_id = %task_id, streaming = streaming);

        self.run(task_id, message, handle, cancel, streaming)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        task_id: &str,
        message: &Message,
        handle: &dyn TaskHandle,
        cancel: &CancellationToken,
        streaming: bool,
    ) -> AgentResult<()> {
        let text = extract_text(message);
        if text.is_empty() {
            let error = AgentError::validation(EMPTY_INPUT_MESSAGE);
            warn!(task_id = %task_id, "Rejecting task without text input");
            report_status(
                handle,
                task_id,
                TaskState::Failed,
                Some(Message::agent_text(error.failure_message())),
            )
            .await;
            return Err(error);
        }

        info!(task_id = %task_id, text_length = text.len(), "Processing task");

        let start_message = if streaming {
            STREAMING_START_MESSAGE
        } else {
            BATCH_START_MESSAGE
        };
        report_status(
            handle,
            task_id,
            TaskState::Working,
            Some(Message::agent_text(start_message)),
        )
        .await;

        let result = if streaming {
            self.run_streaming(text, task_id, handle, cancel).await
        } else {
            self.run_batched(text, task_id, handle).await
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancellation() => {
                info!(task_id = %task_id, reason = %e, "Task canceled");
                report_status(handle, task_id, TaskState::Canceled, None).await;
                Err(e)
            }
            Err(e) => {
                error!(task_id = %task_id, error = %e, kind = ?e.kind(), "Task failed");
                report_status(
                    handle,
                    task_id,
                    TaskState::Failed,
                    Some(Message::agent_text(e.failure_message())),
                )
                .await;
                Err(e)
            }
        }
    }

    async fn run_batched(&self, text: &str, task_id: &str, handle: &dyn TaskHandle) -> AgentResult<()> {
        let reply = self.generator.generate(text, task_id).await?;

        let artifact = Artifact::complete_text(&reply.content, self.generator.model());
        if let Err(e) = handle.add_artifact(artifact).await {
            warn!(task_id = %task_id, error = %e, "Failed to add response artifact");
        }

        report_status(
            handle,
            task_id,
            TaskState::Completed,
            Some(Message::agent_text(BATCH_COMPLETE_MESSAGE)),
        )
        .await;

        info!(task_id = %task_id, intent = %reply.intent, "Task completed");
        Ok(())
    }

    async fn run_streaming(
        &self,
        text: &str,
        task_id: &str,
        handle: &dyn TaskHandle,
        cancel: &CancellationToken,
    ) -> AgentResult<()> {
        let summary = self.generator.stream(text, task_id, handle, cancel).await?;

        report_status(
            handle,
            task_id,
            TaskState::Completed,
            Some(Message::agent_text(streaming_complete_message(summary.chunks))),
        )
        .await;

        info!(
            task_id = %task_id,
            intent = %summary.intent,
            chunks = summary.chunks,
            ttft_ms = summary.time_to_first_token.map(|d| d.as_millis() as u64),
            "Task completed"
        );
        Ok(())
    }
}

async fn report_status(handle: &dyn TaskHandle, task_id: &str, state: TaskState, message: Option<Message>) {
    if let Err(e) = handle.update_status(state, message).await {
        warn!(task_id = %task_id, state = %state, error = %e, "Failed to update task status");
    }
}

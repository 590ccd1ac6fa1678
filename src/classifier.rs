//! Intent classification
//!
//! One batched model call decides which persona the user wants to talk to.
//! Unrecognized answers fall back to the default persona. Once the intent is
//! known, the voice backend is told to switch voices; that notification is
//! best effort and cannot change the classifier's result.

use crate::error::{AgentError, AgentResult};
use crate::llm::provider::{CompletionRequest, LlmProvider};
use crate::persona::Intent;
use crate::voice::VoiceNotifier;
use std::sync::Arc;
use tracing::{info, warn};

/// Fixed instruction sent with every classification request
pub const INTENT_DETECTION_PROMPT: &str = r#"You are an intent detection assistant. You need to determine which AI assistant the user wants to talk to.
Options are:
1. XiaoMei(小美): Female assistant, lively and cute personality, can solve female-related issues.
2. XiaoShuai(小帅): Male assistant, sunny and cheerful personality, can solve male-related issues.
Please only reply with "XiaoMei" or "XiaoShuai""#;

/// Result of classifying one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntentDecision {
    pub intent: Intent,
    /// False when the model's answer was not a known label and the default was used
    pub recognized: bool,
}

/// Map raw model output to an intent (pure function)
pub fn parse_intent(raw: &str) -> IntentDecision {
    match Intent::from_label(raw.trim()) {
        Some(intent) => IntentDecision {
            intent,
            recognized: true,
        },
        None => IntentDecision {
            intent: Intent::default(),
            recognized: false,
        },
    }
}

/// Chooses the persona for a request
pub struct IntentClassifier {
    provider: Arc<dyn LlmProvider>,
    model: String,
    voice: VoiceNotifier,
}

impl IntentClassifier {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>, voice: VoiceNotifier) -> Self {
        Self {
            provider,
            model: model.into(),
            voice,
        }
    }

    /// Build the classification request (pure function)
    fn build_request(&self, text: &str) -> CompletionRequest {
        CompletionRequest::with_system_prompt(self.model.as_str(), INTENT_DETECTION_PROMPT, text)
    }

    /// Classify `text`, then notify the voice backend for `task_id`
    ///
    /// Only a failed classification request is an error; a malformed answer
    /// falls back to the default persona.
    pub async fn classify(&self, text: &str, task_id: &str) -> AgentResult<IntentDecision> {
        let response = self
            .provider
            .complete(self.build_request(text))
            .await
            .map_err(|e| AgentError::classification(e.to_string()))?;

        let raw = response.content.unwrap_or_default();
        let decision = parse_intent(&raw);

        if decision.recognized {
            info!(task_id = %task_id, intent = %decision.intent, "Intent detection result");
        } else {
            warn!(
                task_id = %task_id,
                raw_label = %raw.trim(),
                default = %decision.intent,
                "Could not clearly identify intent, using default persona"
            );
        }

        // The notifier logs the outcome; it never reaches the caller.
        let _ = self.voice.notify(task_id, decision.intent).await;

        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::mocks::{MockLlmProvider, MockVoiceBackend};

    fn classifier_with(
        provider: Arc<MockLlmProvider>,
        voice: Arc<MockVoiceBackend>,
    ) -> IntentClassifier {
        IntentClassifier::new(provider, "mock-model", VoiceNotifier::new(voice))
    }

    #[test]
    fn test_parse_intent_trims_whitespace() {
        assert_eq!(
            parse_intent("  XiaoShuai\n"),
            IntentDecision {
                intent: Intent::XiaoShuai,
                recognized: true
            }
        );
    }

    #[test]
    fn test_parse_intent_falls_back_to_default() {
        for raw in ["", "xiaoshuai", "I think XiaoShuai", "Neither", "小帅"] {
            let decision = parse_intent(raw);
            assert_eq!(decision.intent, Intent::XiaoMei, "input: {raw:?}");
            assert!(!decision.recognized);
        }
    }

    #[tokio::test]
    async fn test_classify_sends_fixed_prompt_and_user_text() {
        let provider = Arc::new(MockLlmProvider::new(vec!["XiaoShuai".to_string()]));
        let voice = Arc::new(MockVoiceBackend::new());
        let classifier = classifier_with(provider.clone(), voice);

        let decision = classifier.classify("I want a guy", "task-1").await.unwrap();

        assert_eq!(decision.intent, Intent::XiaoShuai);
        let requests = provider.get_complete_requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].system_prompt(), Some(INTENT_DETECTION_PROMPT));
        assert_eq!(requests[0].messages[1].content, "I want a guy");
        assert!(provider.get_stream_requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_label_is_not_an_error() {
        let provider = Arc::new(MockLlmProvider::new(vec!["Bob".to_string()]));
        let classifier = classifier_with(provider, Arc::new(MockVoiceBackend::new()));

        let decision = classifier.classify("hi", "task-1").await.unwrap();

        assert_eq!(decision.intent, Intent::XiaoMei);
        assert!(!decision.recognized);
    }

    #[tokio::test]
    async fn test_transport_failure_is_classification_error() {
        let provider = Arc::new(MockLlmProvider::with_failure());
        let voice = Arc::new(MockVoiceBackend::new());
        let classifier = classifier_with(provider, voice.clone());

        let error = classifier.classify("hi", &"x".repeat(80)).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Classification);
        assert!(voice.get_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_voice_failure_does_not_change_result() {
        let provider = Arc::new(MockLlmProvider::new(vec!["XiaoShuai".to_string()]));
        let voice = Arc::new(MockVoiceBackend::with_failure());
        let classifier = classifier_with(provider, voice.clone());

        let decision = classifier.classify("hi", &"x".repeat(80)).await.unwrap();

        assert_eq!(decision.intent, Intent::XiaoShuai);
        assert_eq!(voice.get_calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_voice_gate_on_task_id_length() {
        let long_id = "L".repeat(80);
        let short_id = "S".repeat(10);

        let provider = Arc::new(MockLlmProvider::new(vec!["XiaoShuai".to_string()]));
        let voice = Arc::new(MockVoiceBackend::new());
        let classifier = classifier_with(provider, voice.clone());

        classifier.classify("hi", &long_id).await.unwrap();
        classifier.classify("hi", &short_id).await.unwrap();

        assert_eq!(voice.get_calls().await, vec![(long_id, Intent::XiaoShuai)]);
    }
}

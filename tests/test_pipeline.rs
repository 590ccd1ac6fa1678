//! End-to-end pipeline tests
//!
//! Drives the task processor with mock collaborators and checks what the task
//! runtime observes: the status sequence, the artifacts, and the outcome.

use persona_agent::error::ErrorKind;
use persona_agent::persona::{Intent, PersonaRegistry};
use persona_agent::processor::{
    TaskProcessor, BATCH_COMPLETE_MESSAGE, BATCH_START_MESSAGE, EMPTY_INPUT_MESSAGE,
    STREAMING_START_MESSAGE,
};
use persona_agent::protocol::{Message, MessageRole, Part, TaskState};
use persona_agent::testing::mocks::{MockLlmProvider, MockTaskHandle, MockVoiceBackend};
use persona_agent::voice::VoiceNotifier;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn processor_with(provider: Arc<MockLlmProvider>, voice: Arc<MockVoiceBackend>) -> TaskProcessor {
    TaskProcessor::from_parts(
        provider,
        "gpt-4o-mini",
        PersonaRegistry::default(),
        VoiceNotifier::new(voice),
    )
}

fn processor(provider: Arc<MockLlmProvider>) -> TaskProcessor {
    processor_with(provider, Arc::new(MockVoiceBackend::new()))
}

#[tokio::test]
async fn test_message_without_text_fails_validation() {
    let provider = Arc::new(MockLlmProvider::single_response("XiaoMei"));
    let handle = MockTaskHandle::new(true);
    let message = Message::new(
        MessageRole::User,
        vec![Part::Data {
            data: serde_json::json!({"audio": "..."}),
        }],
    );

    let error = processor(provider.clone())
        .process("task-1", &message, &handle, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Validation);
    assert_eq!(provider.call_count().await, 0);
    assert_eq!(handle.get_states().await, vec![TaskState::Failed]);
    assert_eq!(
        handle.final_message_text().await.as_deref(),
        Some(EMPTY_INPUT_MESSAGE)
    );
}

#[tokio::test]
async fn test_empty_string_text_fails_validation() {
    let provider = Arc::new(MockLlmProvider::single_response("XiaoMei"));
    let handle = MockTaskHandle::new(false);

    let error = processor(provider.clone())
        .process("task-1", &Message::user_text(""), &handle, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Validation);
    assert_eq!(provider.call_count().await, 0);
    assert_eq!(handle.final_state().await, Some(TaskState::Failed));
}

#[tokio::test]
async fn test_hello_batched_uses_xiao_mei() {
    let provider = Arc::new(MockLlmProvider::new(vec![
        "XiaoMei".to_string(),
        "Hi! Nice to meet you~".to_string(),
    ]));
    let handle = MockTaskHandle::new(false);

    processor(provider.clone())
        .process("task-1", &Message::user_text("hello"), &handle, &CancellationToken::new())
        .await
        .unwrap();

    let requests = provider.get_complete_requests().await;
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[1].system_prompt(),
        Some(PersonaRegistry::default().system_prompt(Intent::XiaoMei).unwrap())
    );

    let artifacts = handle.get_artifacts().await;
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].index, 0);
    assert!(artifacts[0].last_chunk);
    assert_eq!(artifacts[0].text(), "Hi! Nice to meet you~");

    let statuses = handle.get_statuses().await;
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0].0, TaskState::Working);
    assert_eq!(
        statuses[0].1.as_ref().and_then(|m| m.first_text()),
        Some(BATCH_START_MESSAGE)
    );
    assert_eq!(statuses[1].0, TaskState::Completed);
    assert_eq!(
        statuses[1].1.as_ref().and_then(|m| m.first_text()),
        Some(BATCH_COMPLETE_MESSAGE)
    );
}

#[tokio::test]
async fn test_unknown_label_falls_back_to_default_persona() {
    let provider = Arc::new(MockLlmProvider::new(vec![
        "Bob".to_string(),
        "reply".to_string(),
    ]));
    let handle = MockTaskHandle::new(false);

    processor(provider.clone())
        .process("task-1", &Message::user_text("hi"), &handle, &CancellationToken::new())
        .await
        .unwrap();

    let requests = provider.get_complete_requests().await;
    assert_eq!(
        requests[1].system_prompt(),
        Some(PersonaRegistry::default().system_prompt(Intent::XiaoMei).unwrap())
    );
    assert_eq!(handle.final_state().await, Some(TaskState::Completed));
}

#[tokio::test]
async fn test_streaming_emits_ordered_chunks_then_closing_artifact() {
    let provider = Arc::new(MockLlmProvider::streaming("XiaoShuai", vec!["Hey", " there", ", bro", "!"]));
    let handle = MockTaskHandle::new(true);

    processor(provider.clone())
        .process("task-1", &Message::user_text("yo"), &handle, &CancellationToken::new())
        .await
        .unwrap();

    let stream_requests = provider.get_stream_requests().await;
    assert_eq!(stream_requests.len(), 1);
    assert_eq!(
        stream_requests[0].system_prompt(),
        Some(PersonaRegistry::default().system_prompt(Intent::XiaoShuai).unwrap())
    );

    let artifacts = handle.get_artifacts().await;
    assert_eq!(artifacts.len(), 5);
    for (i, artifact) in artifacts[..4].iter().enumerate() {
        assert_eq!(artifact.index, i);
        assert_eq!(artifact.append, i > 0);
        assert!(!artifact.last_chunk);
    }
    let closing = &artifacts[4];
    assert!(closing.last_chunk);
    assert_eq!(closing.index, 3);
    assert!(closing.parts.is_empty());
    assert_eq!(artifacts.iter().filter(|a| a.last_chunk).count(), 1);

    let statuses = handle.get_statuses().await;
    assert_eq!(
        statuses.first().and_then(|(_, m)| m.as_ref()).and_then(|m| m.first_text()),
        Some(STREAMING_START_MESSAGE)
    );
    // Start message, one update per chunk, then completion.
    assert_eq!(statuses.len(), 6);
    assert_eq!(
        statuses[1].1.as_ref().and_then(|m| m.first_text()),
        Some("Hey")
    );
    assert_eq!(handle.final_state().await, Some(TaskState::Completed));
    assert_eq!(
        handle.final_message_text().await.as_deref(),
        Some("Processing complete. Received 4 chunks.")
    );
}

#[tokio::test]
async fn test_streaming_without_increments_completes_without_artifacts() {
    let provider = Arc::new(MockLlmProvider::streaming("XiaoMei", vec!["", ""]));
    let handle = MockTaskHandle::new(true);

    processor(provider)
        .process("task-1", &Message::user_text("hi"), &handle, &CancellationToken::new())
        .await
        .unwrap();

    assert!(handle.get_artifacts().await.is_empty());
    assert_eq!(
        handle.get_states().await,
        vec![TaskState::Working, TaskState::Completed]
    );
    assert_eq!(
        handle.final_message_text().await.as_deref(),
        Some("Processing complete. Received 0 chunks.")
    );
}

#[tokio::test]
async fn test_cancel_after_second_chunk_stops_stream() {
    let provider = Arc::new(MockLlmProvider::streaming("XiaoMei", vec!["a", "b", "c", "d"]));
    let cancel = CancellationToken::new();
    let handle = MockTaskHandle::new(true).cancel_after(2, cancel.clone());

    let error = processor(provider)
        .process("task-1", &Message::user_text("hi"), &handle, &cancel)
        .await
        .unwrap_err();

    assert!(error.is_cancellation());
    assert_eq!(error.kind(), ErrorKind::Cancellation);

    let artifacts = handle.get_artifacts().await;
    assert_eq!(artifacts.len(), 2);
    assert!(artifacts.iter().all(|a| !a.last_chunk));

    let statuses = handle.get_statuses().await;
    let (state, message) = statuses.last().unwrap();
    assert_eq!(*state, TaskState::Canceled);
    assert!(message.is_none());
    assert!(!statuses
        .iter()
        .any(|(s, _)| matches!(s, TaskState::Completed | TaskState::Failed)));
}

#[tokio::test]
async fn test_cancel_while_waiting_for_next_chunk() {
    let provider = Arc::new(
        MockLlmProvider::streaming("XiaoMei", vec!["first"]).hanging_after_script(),
    );
    let handle = MockTaskHandle::new(true);
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        processor(provider).process("task-1", &Message::user_text("hi"), &handle, &cancel),
    )
    .await
    .expect("cancellation should interrupt the pending receive");

    assert!(result.unwrap_err().is_cancellation());
    assert_eq!(handle.get_artifacts().await.len(), 1);
    assert_eq!(handle.final_state().await, Some(TaskState::Canceled));
}

#[tokio::test]
async fn test_generation_failure_reports_failed() {
    let provider = Arc::new(
        MockLlmProvider::single_response("XiaoMei").with_stream_open_error(
            persona_agent::llm::LlmError::NetworkError("connection refused".to_string()),
        ),
    );
    let handle = MockTaskHandle::new(true);

    let error = processor(provider)
        .process("task-1", &Message::user_text("hi"), &handle, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Generation);
    assert_eq!(handle.final_state().await, Some(TaskState::Failed));
    assert!(handle
        .final_message_text()
        .await
        .unwrap()
        .starts_with("Failed to process: "));
}

#[tokio::test]
async fn test_long_task_id_updates_voice() {
    let provider = Arc::new(MockLlmProvider::new(vec![
        "XiaoShuai".to_string(),
        "reply".to_string(),
    ]));
    let voice = Arc::new(MockVoiceBackend::new());
    let task_id = "v".repeat(80);

    processor_with(provider, voice.clone())
        .process(&task_id, &Message::user_text("hi"), &MockTaskHandle::new(false), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(voice.get_calls().await, vec![(task_id, Intent::XiaoShuai)]);
}

#[tokio::test]
async fn test_short_task_id_skips_voice() {
    let provider = Arc::new(MockLlmProvider::new(vec![
        "XiaoShuai".to_string(),
        "reply".to_string(),
    ]));
    let voice = Arc::new(MockVoiceBackend::new());

    processor_with(provider, voice.clone())
        .process(&"v".repeat(10), &Message::user_text("hi"), &MockTaskHandle::new(false), &CancellationToken::new())
        .await
        .unwrap();

    assert!(voice.get_calls().await.is_empty());
}

#[tokio::test]
async fn test_voice_failure_does_not_affect_task() {
    let provider = Arc::new(MockLlmProvider::streaming("XiaoShuai", vec!["ok"]));
    let voice = Arc::new(MockVoiceBackend::with_failure());
    let handle = MockTaskHandle::new(true);

    processor_with(provider, voice.clone())
        .process(&"v".repeat(80), &Message::user_text("hi"), &handle, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(voice.get_calls().await.len(), 1);
    assert_eq!(handle.final_state().await, Some(TaskState::Completed));
}

#[tokio::test]
async fn test_reporting_failures_never_abort_streaming() {
    let provider = Arc::new(MockLlmProvider::streaming("XiaoMei", vec!["a", "b"]));
    let handle = MockTaskHandle::with_failure(true);

    processor(provider)
        .process("task-1", &Message::user_text("hi"), &handle, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(handle.get_artifacts().await.len(), 3);
    assert_eq!(handle.final_state().await, Some(TaskState::Completed));
}

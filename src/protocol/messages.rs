//! Message and artifact types exchanged with the task runtime
//!
//! This module defines the agent-facing message structures: messages made of
//! typed parts, the task lifecycle states, and the artifacts a task emits.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Agent,
}

/// A single typed part of a message or artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    /// Plain text content
    Text { text: String },
    /// Structured JSON content
    Data { data: Value },
}

impl Part {
    /// Create a text part
    pub fn text<S: Into<String>>(text: S) -> Self {
        Part::Text { text: text.into() }
    }

    /// Borrow the text of this part if it is a text part
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            Part::Data { .. } => None,
        }
    }
}

/// An ordered sequence of parts authored by a user or the agent
///
/// # Examples
/// ```
/// use persona_agent::protocol::{Message, MessageRole, Part};
///
/// let message = Message::new(MessageRole::User, vec![Part::text("hello")]);
/// assert_eq!(message.first_text(), Some("hello"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: String,
    pub role: MessageRole,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn new(role: MessageRole, parts: Vec<Part>) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            role,
            parts,
        }
    }

    /// Agent-authored message holding a single text part
    pub fn agent_text<S: Into<String>>(text: S) -> Self {
        Self::new(MessageRole::Agent, vec![Part::text(text)])
    }

    /// User-authored message holding a single text part
    pub fn user_text<S: Into<String>>(text: S) -> Self {
        Self::new(MessageRole::User, vec![Part::text(text)])
    }

    /// Text of the first text part, skipping any non-text parts before it
    pub fn first_text(&self) -> Option<&str> {
        self.parts.iter().find_map(Part::as_text)
    }
}

/// Extract the first text part of a message
///
/// Returns an empty string when the message carries no text part. Callers treat
/// the empty string as "no usable input".
pub fn extract_text(message: &Message) -> &str {
    message.first_text().unwrap_or("")
}

/// Lifecycle state of a task
///
/// `Validating` and `Working` are transient; the others are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Validating,
    Working,
    Completed,
    Failed,
    Canceled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Canceled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Validating => "validating",
            TaskState::Working => "working",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Canceled => "canceled",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata keys attached to emitted artifacts
pub mod metadata_keys {
    pub const TIMESTAMP: &str = "timestamp";
    pub const CHUNK_SIZE: &str = "chunk_size";
    pub const CHUNK_INDEX: &str = "chunk_index";
    pub const TOTAL_LENGTH: &str = "total_length";
    pub const TOTAL_CHUNKS: &str = "total_chunks";
    pub const MODEL: &str = "model";
    pub const IS_STREAMING: &str = "is_streaming";
    pub const IS_LAST_CHUNK: &str = "is_last_chunk";
}

/// One unit of task output
///
/// A streamed reply is delivered as a run of artifacts: content chunks with
/// `append` set after the first, then a closing artifact with `last_chunk`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub index: usize,
    pub parts: Vec<Part>,
    #[serde(default)]
    pub append: bool,
    #[serde(default)]
    pub last_chunk: bool,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Artifact {
    /// Content artifact for the streamed increment at `index`
    pub fn stream_chunk(index: usize, content: &str, total_length: usize, model: &str) -> Self {
        use metadata_keys::*;

        let mut metadata = Map::new();
        metadata.insert(TIMESTAMP.into(), Value::from(unix_nanos()));
        metadata.insert(CHUNK_SIZE.into(), Value::from(content.len()));
        metadata.insert(CHUNK_INDEX.into(), Value::from(index));
        metadata.insert(TOTAL_LENGTH.into(), Value::from(total_length));
        metadata.insert(MODEL.into(), Value::from(model));
        metadata.insert(IS_STREAMING.into(), Value::Bool(true));

        Self {
            name: Some(format!("Chunk {}", index + 1)),
            description: Some("Streaming chunk from the model".to_string()),
            index,
            parts: vec![Part::text(content)],
            append: index > 0,
            last_chunk: false,
            metadata,
        }
    }

    /// Zero-content artifact closing a stream of `total_chunks` (> 0) chunks
    pub fn closing_chunk(total_chunks: usize, total_length: usize, model: &str) -> Self {
        use metadata_keys::*;

        let mut metadata = Map::new();
        metadata.insert(TIMESTAMP.into(), Value::from(unix_nanos()));
        metadata.insert(TOTAL_CHUNKS.into(), Value::from(total_chunks));
        metadata.insert(TOTAL_LENGTH.into(), Value::from(total_length));
        metadata.insert(MODEL.into(), Value::from(model));
        metadata.insert(IS_STREAMING.into(), Value::Bool(true));
        metadata.insert(IS_LAST_CHUNK.into(), Value::Bool(true));

        Self {
            name: Some(format!("Chunk {total_chunks}")),
            description: Some("Final chunk from the model".to_string()),
            index: total_chunks.saturating_sub(1),
            parts: Vec::new(),
            append: false,
            last_chunk: true,
            metadata,
        }
    }

    /// Single artifact carrying a complete, non-streamed reply
    pub fn complete_text(content: &str, model: &str) -> Self {
        use metadata_keys::*;

        let mut metadata = Map::new();
        metadata.insert(TIMESTAMP.into(), Value::from(unix_nanos()));
        metadata.insert(TOTAL_LENGTH.into(), Value::from(content.len()));
        metadata.insert(MODEL.into(), Value::from(model));
        metadata.insert(IS_STREAMING.into(), Value::Bool(false));

        Self {
            name: Some("Processed Text".to_string()),
            description: Some("Complete processed text from the model".to_string()),
            index: 0,
            parts: vec![Part::text(content)],
            append: false,
            last_chunk: true,
            metadata,
        }
    }

    /// Concatenated text of all text parts
    pub fn text(&self) -> String {
        self.parts.iter().filter_map(Part::as_text).collect()
    }
}

fn unix_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

//! Task runtime capability
//!
//! The task runtime owns task records. The pipeline only sees this capability
//! surface, which lets it report status and deliver artifacts for one task.

use crate::protocol::{Artifact, Message, TaskState};
use async_trait::async_trait;
use thiserror::Error;

/// Failure to deliver a status update or artifact to the runtime
///
/// Never terminal: the pipeline logs these and keeps going.
#[derive(Debug, Clone, Error)]
pub enum ReportingError {
    #[error("Status update rejected: {0}")]
    StatusRejected(String),
    #[error("Artifact rejected: {0}")]
    ArtifactRejected(String),
    #[error("Task runtime unavailable: {0}")]
    Unavailable(String),
}

/// Handle onto a single task owned by the runtime
///
/// Implementations must be safe to call from the task's own execution unit;
/// the pipeline never shares a handle between tasks.
#[async_trait]
pub trait TaskHandle: Send + Sync {
    /// Whether the caller asked for an incrementally streamed reply
    fn is_streaming_request(&self) -> bool;

    /// Replace the task's current status, optionally attaching an agent message
    async fn update_status(
        &self,
        state: TaskState,
        message: Option<Message>,
    ) -> Result<(), ReportingError>;

    /// Append an artifact to the task's output
    async fn add_artifact(&self, artifact: Artifact) -> Result<(), ReportingError>;
}

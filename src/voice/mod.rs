//! Voice backend side channel
//!
//! After intent detection the pipeline asks the voice backend to switch the
//! live conversation's TTS voice to the chosen persona. The call is best
//! effort: its outcome is logged and never reaches the pipeline's result.

pub mod trtc;

pub use trtc::{TrtcClient, TrtcConfig, TtsCredentials};

use crate::persona::Intent;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn, Instrument};

/// Task ids must be strictly longer than this to be sent to the voice backend.
///
/// Shorter ids are treated as not belonging to a live voice session.
pub const VOICE_SESSION_MIN_TASK_ID_LEN: usize = 64;

/// Voice backend errors
#[derive(Debug, Clone, Error)]
pub enum VoiceError {
    #[error("Voice backend not configured: {0}")]
    NotConfigured(String),
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("API error: {code}: {message}")]
    ApiError { code: String, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Capability that reconfigures the TTS voice of a running conversation
#[async_trait]
pub trait VoiceBackend: Send + Sync {
    async fn set_voice(&self, task_id: &str, intent: Intent) -> Result<(), VoiceError>;
}

/// Whether a task id identifies a voice session the backend can update
pub fn is_voice_session(task_id: &str) -> bool {
    task_id.len() > VOICE_SESSION_MIN_TASK_ID_LEN
}

/// What happened to a voice update request. Only ever logged.
#[derive(Debug)]
pub enum VoiceUpdateOutcome {
    Updated,
    Failed(VoiceError),
    Skipped,
}

/// Fire-and-forget notifier applying the task id gate in front of a backend
///
/// ```
/// use persona_agent::persona::Intent;
/// use persona_agent::voice::{VoiceNotifier, VoiceUpdateOutcome};
///
/// # tokio_test::block_on(async {
/// let outcome = VoiceNotifier::disabled().notify("task-1", Intent::XiaoMei).await;
/// assert!(matches!(outcome, VoiceUpdateOutcome::Skipped));
/// # });
/// ```
#[derive(Clone, Default)]
pub struct VoiceNotifier {
    backend: Option<Arc<dyn VoiceBackend>>,
}

impl VoiceNotifier {
    pub fn new(backend: Arc<dyn VoiceBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Notifier that never calls out; every update is skipped
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Ask the backend to switch voices, logging whatever happens
    pub async fn notify(&self, task_id: &str, intent: Intent) -> VoiceUpdateOutcome {
        let Some(backend) = &self.backend else {
            debug!(task_id = %task_id, intent = %intent, "Voice backend disabled, skipping TTS update");
            return VoiceUpdateOutcome::Skipped;
        };

        info!(task_id = %task_id, intent = %intent, "Starting TTS update");

        if !is_voice_session(task_id) {
            warn!(
                task_id = %task_id,
                task_id_len = task_id.len(),
                intent = %intent,
                "Invalid task id length for TTS update, skipping"
            );
            return VoiceUpdateOutcome::Skipped;
        }

        let update = backend
            .set_voice(task_id, intent)
            .instrument(crate::voice_span!(task_id = %task_id, intent = %intent));

        match update.await {
            Ok(()) => {
                info!(task_id = %task_id, intent = %intent, "Successfully updated TTS voice");
                VoiceUpdateOutcome::Updated
            }
            Err(e) => {
                warn!(task_id = %task_id, intent = %intent, error = %e, "Failed to update TTS voice");
                VoiceUpdateOutcome::Failed(e)
            }
        }
    }
}

type BackendFactory = Box<dyn Fn() -> Result<Arc<dyn VoiceBackend>, VoiceError> + Send + Sync>;

/// Voice backend built on first use and shared afterwards
///
/// Construction runs at most once successfully; a failed construction is
/// reported to that caller and retried by the next one.
pub struct LazyVoiceBackend {
    cell: OnceCell<Arc<dyn VoiceBackend>>,
    factory: BackendFactory,
}

impl LazyVoiceBackend {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn VoiceBackend>, VoiceError> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            factory: Box::new(factory),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    fn backend(&self) -> Result<&Arc<dyn VoiceBackend>, VoiceError> {
        self.cell.get_or_try_init(|| {
            debug!("Initializing voice backend client");
            (self.factory)()
        })
    }
}

#[async_trait]
impl VoiceBackend for LazyVoiceBackend {
    async fn set_voice(&self, task_id: &str, intent: Intent) -> Result<(), VoiceError> {
        let backend = self.backend()?.clone();
        backend.set_voice(task_id, intent).await
    }
}

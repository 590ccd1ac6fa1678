//! Persona Agent
//!
//! Routes a text request to one of two persona-specific assistants and
//! delivers the model's reply to a task runtime, either as one artifact or as
//! an ordered stream of chunk artifacts.
//!
//! # Overview
//!
//! - [`classifier`]: one model call picks the persona (XiaoMei or XiaoShuai)
//!   and notifies the voice backend
//! - [`generator`]: batched or streamed generation with the persona's prompt
//! - [`processor`]: drives the task through its lifecycle states
//! - [`llm`]: the model backend trait and an OpenAI-compatible client
//! - [`voice`]: the voice backend trait and a Tencent RTC client
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use persona_agent::llm::{OpenAiConfig, OpenAiProvider};
//! use persona_agent::persona::PersonaRegistry;
//! use persona_agent::processor::TaskProcessor;
//! use persona_agent::protocol::Message;
//! use persona_agent::task::TaskHandle;
//! use persona_agent::voice::VoiceNotifier;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run(handle: &dyn TaskHandle) -> Result<(), Box<dyn std::error::Error>> {
//! let provider = OpenAiProvider::new(OpenAiConfig {
//!     api_key: std::env::var("OPENAI_API_KEY")?,
//!     ..Default::default()
//! })?;
//!
//! let processor = TaskProcessor::from_parts(
//!     Arc::new(provider),
//!     "gpt-3.5-turbo",
//!     PersonaRegistry::default(),
//!     VoiceNotifier::disabled(),
//! );
//!
//! processor
//!     .process("task-1", &Message::user_text("hello"), handle, &CancellationToken::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod config;
pub mod error;
pub mod generator;
pub mod llm;
pub mod observability;
pub mod persona;
pub mod processor;
pub mod protocol;
pub mod task;
pub mod testing;
pub mod voice;

pub use classifier::{IntentClassifier, IntentDecision};
pub use config::{AgentConfig, ConfigError};
pub use error::{AgentError, AgentResult, ErrorKind};
pub use generator::{GeneratedReply, ResponseGenerator, StreamSummary};
pub use persona::{Intent, PersonaRegistry};
pub use processor::TaskProcessor;
pub use protocol::*;
pub use task::{ReportingError, TaskHandle};

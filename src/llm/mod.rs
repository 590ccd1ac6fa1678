//! Model backend abstraction
//!
//! Provider-agnostic interface for batched and streamed chat completions,
//! plus the OpenAI-compatible implementation.

pub mod provider;
pub mod providers;

pub use provider::*;
pub use providers::*;

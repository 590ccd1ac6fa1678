//! Agent-facing protocol types
//!
//! Messages, parts, task states and artifacts shared between the pipeline and
//! the task runtime that hosts it.

pub mod messages;

pub use messages::*;

//! Testing utilities and mock implementations
//!
//! Mock collaborators for exercising the pipeline without a model backend,
//! a task runtime, or a voice service.

pub mod mocks;

pub use mocks::*;

//! Error taxonomy for the task pipeline
//!
//! Four error kinds are terminal for a task: validation, classification,
//! generation and cancellation. Everything else reaching this type is an
//! internal or configuration fault. Reporting failures never get here.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("valid secret pattern")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("valid path pattern")
});

const MAX_FAILURE_MESSAGE_LEN: usize = 500;

/// Main error type for pipeline operations
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("{message}")]
    Validation { message: String },

    #[error("intent detection failed: {message}")]
    Classification { message: String },

    #[error("generation failed: {message}")]
    Generation { message: String },

    #[error("task canceled: {message}")]
    Canceled { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

/// Discriminant of [`AgentError`], used by callers and tests to branch on kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Classification,
    Generation,
    Cancellation,
    Config,
    Internal,
}

impl AgentError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn classification<S: Into<String>>(message: S) -> Self {
        Self::Classification {
            message: message.into(),
        }
    }

    pub fn generation<S: Into<String>>(message: S) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    pub fn canceled<S: Into<String>>(message: S) -> Self {
        Self::Canceled {
            message: message.into(),
        }
    }

    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::Validation { .. } => ErrorKind::Validation,
            AgentError::Classification { .. } => ErrorKind::Classification,
            AgentError::Generation { .. } => ErrorKind::Generation,
            AgentError::Canceled { .. } => ErrorKind::Cancellation,
            AgentError::Config(_) => ErrorKind::Config,
            AgentError::InternalError { .. } => ErrorKind::Internal,
        }
    }

    /// Whether this error ends the task in the canceled state rather than failed
    pub fn is_cancellation(&self) -> bool {
        matches!(self, AgentError::Canceled { .. })
    }

    /// User-visible text attached to the task's final failed status
    pub fn failure_message(&self) -> String {
        let text = match self {
            AgentError::Validation { message } => message.clone(),
            other => format!("Failed to process: {other}"),
        };
        sanitize_error_message(&text)
    }
}

/// Redact secrets and sensitive paths, then cap the length
fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}=***")
        .to_string();

    sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_FAILURE_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_FAILURE_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for pipeline operations
pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(AgentError::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(
            AgentError::classification("x").kind(),
            ErrorKind::Classification
        );
        assert_eq!(AgentError::generation("x").kind(), ErrorKind::Generation);
        assert_eq!(AgentError::canceled("x").kind(), ErrorKind::Cancellation);
        assert_eq!(AgentError::internal_error("x").kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_validation_failure_message_quotes_error() {
        let error = AgentError::validation("input message must contain text");
        assert_eq!(error.failure_message(), "input message must contain text");
        assert_eq!(error.to_string(), "input message must contain text");
    }

    #[test]
    fn test_generation_failure_message_embeds_error() {
        let error = AgentError::generation("no choices in model response");
        assert_eq!(
            error.failure_message(),
            "Failed to process: generation failed: no choices in model response"
        );
    }

    #[test]
    fn test_only_cancellation_is_cancellation() {
        assert!(AgentError::canceled("ctx").is_cancellation());
        assert!(!AgentError::generation("boom").is_cancellation());
    }

    #[test]
    fn test_failure_message_redacts_secrets() {
        let error = AgentError::classification("upstream said api_key=sk-123 token: abc");
        let message = error.failure_message();

        assert!(!message.contains("sk-123"));
        assert!(!message.contains("abc"));
        assert!(message.contains("key=***"));
    }

    #[test]
    fn test_file_path_redaction() {
        let sanitized = sanitize_error_message("could not read /home/user/.ssh/id_rsa");

        assert!(sanitized.contains("/***REDACTED***/"));
        assert!(!sanitized.contains("id_rsa"));
    }

    #[test]
    fn test_long_message_truncation() {
        let sanitized = sanitize_error_message(&"x".repeat(600));

        assert!(sanitized.len() <= MAX_FAILURE_MESSAGE_LEN);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let sanitized = sanitize_error_message(&"小美".repeat(200));

        assert!(sanitized.len() <= MAX_FAILURE_MESSAGE_LEN);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_sanitize_empty_message() {
        assert_eq!(sanitize_error_message(""), "");
    }
}

//! Error types for Feedloom.
//!
//! Library crates use [`FeedloomError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Feedloom operations.
#[derive(Debug, thiserror::Error)]
pub enum FeedloomError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during feed resolution or content fetch.
    #[error("network error: {0}")]
    Network(String),

    /// Feed document or content parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Text-service gateway error (transport or response shape).
    #[error("textgen error: {0}")]
    Textgen(String),

    /// Speech synthesis error.
    #[error("speech error: {0}")]
    Speech(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (duplicate feed URL, invalid voice, empty input).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FeedloomError>;

impl FeedloomError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = FeedloomError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = FeedloomError::validation("feed URL already registered");
        assert!(err.to_string().contains("already registered"));
    }
}

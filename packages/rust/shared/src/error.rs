//! Error types for StudyKit.
//!
//! Library crates use [`StudyKitError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Only input rejection and extraction failures are fatal for ingestion.
//! A document without chapter headers, or a section without tips, is a
//! valid (degraded) result and never surfaces here.

use std::path::PathBuf;

/// Top-level error type for all StudyKit operations.
#[derive(Debug, thiserror::Error)]
pub enum StudyKitError {
    /// Input refused before parsing (empty, oversized, unsupported media type).
    #[error("input rejected: {message}")]
    InputRejected { message: String },

    /// Underlying page or byte decode failure.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Study session lifecycle error.
    #[error("session error: {0}")]
    Session(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, StudyKitError>;

impl StudyKitError {
    /// Create an input rejection from any displayable message.
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::InputRejected {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
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

    /// Whether this error was raised before any parsing happened.
    pub fn is_input_rejection(&self) -> bool {
        matches!(self, Self::InputRejected { .. })
    }
}

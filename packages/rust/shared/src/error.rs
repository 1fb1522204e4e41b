//! Error types for FightSync.
//!
//! Library crates use [`FightSyncError`] via `thiserror`. The CLI wraps
//! this with `color-eyre` for rich diagnostics. Recoverable conditions —
//! an unmatched name, a diverging external identifier — are modeled as
//! data (`MatchOutcome`, `ConflictRecord`), not as error variants.

use std::path::PathBuf;

/// Top-level error type for all FightSync operations.
#[derive(Debug, thiserror::Error)]
pub enum FightSyncError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during a fetch (timeout, non-success status).
    #[error("fetch error: {0}")]
    Fetch(String),

    /// An extractor found no usable structure for one record.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

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
pub type Result<T> = std::result::Result<T, FightSyncError>;

impl FightSyncError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a fetch error from any displayable message.
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
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

    /// True for errors that should be queued for retry rather than
    /// aborting a stage (network failures, timeouts).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = FightSyncError::config("missing data directory");
        assert_eq!(err.to_string(), "config error: missing data directory");

        let err = FightSyncError::fetch("HTTP 503");
        assert_eq!(err.to_string(), "fetch error: HTTP 503");
    }

    #[test]
    fn retryable_classification() {
        assert!(FightSyncError::fetch("timeout").is_retryable());
        assert!(!FightSyncError::parse("no record block").is_retryable());
        assert!(!FightSyncError::Storage("locked".into()).is_retryable());
    }
}

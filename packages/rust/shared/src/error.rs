//! Error types for contractscope.
//!
//! Library crates use [`ContractScopeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all contractscope operations.
#[derive(Debug, thiserror::Error)]
pub enum ContractScopeError {
    /// Configuration loading or validation error (including missing credentials).
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to the feed, source store, or analysis engine.
    #[error("network error: {0}")]
    Network(String),

    /// Contract source could not be obtained from the source store.
    #[error("source unavailable for {contract}: {reason}")]
    SourceUnavailable { contract: String, reason: String },

    /// Analysis engine invocation or response parsing failed.
    #[error("analysis error: {0}")]
    Analysis(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (malformed dataset file, bad response shape, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ContractScopeError>;

impl ContractScopeError {
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

    /// Mark a contract's source as unavailable.
    pub fn source_unavailable(contract: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            contract: contract.into(),
            reason: reason.into(),
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
        let err = ContractScopeError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = ContractScopeError::source_unavailable("SP000.token", "HTTP 404");
        assert_eq!(
            err.to_string(),
            "source unavailable for SP000.token: HTTP 404"
        );

        let err = ContractScopeError::validation("expected a JSON array");
        assert!(err.to_string().contains("JSON array"));
    }
}

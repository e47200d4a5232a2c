//! Error types for BuildRelay.
//!
//! Library crates use [`BuildRelayError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all BuildRelay operations.
#[derive(Debug, thiserror::Error)]
pub enum BuildRelayError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to the build service or a remote.
    #[error("network error: {0}")]
    Network(String),

    /// A required entity was absent: no insertable build, missing artifact,
    /// missing policy evaluation, no manifest URLs.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// Archive download or extraction error.
    #[error("archive error: {0}")]
    Archive(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Upstream data did not have the expected shape (log marker absent,
    /// malformed manifest JSON).
    #[error("upstream format error: {message}")]
    UpstreamFormat { message: String },

    /// Operation is not supported for the given input (e.g. commit diff
    /// against a non-GitHub repository).
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The operation was cancelled cooperatively.
    #[error("operation cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BuildRelayError>;

impl BuildRelayError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a not-found error from any displayable message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound {
            message: msg.into(),
        }
    }

    /// Create an upstream-format error from any displayable message.
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::UpstreamFormat {
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
        let err = BuildRelayError::config("missing service token");
        assert_eq!(err.to_string(), "config error: missing service token");

        let err = BuildRelayError::not_found("no insertable build for queue ci/main");
        assert!(err.to_string().contains("queue ci/main"));

        let err = BuildRelayError::upstream("manifest marker absent");
        assert!(err.to_string().starts_with("upstream format error"));
    }
}

//! Error types for keel
//!
//! One central enum shared by every layer; constructors and helpers below.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// keel error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Namespace is required")]
    NamespaceRequired,

    // ========================================================================
    // Resources
    // ========================================================================
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // ========================================================================
    // Shim launch
    // ========================================================================
    #[error("Launch error: {0}")]
    Launch(String),

    // ========================================================================
    // RPC
    // ========================================================================
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote error: {method} - {message}")]
    Remote { method: String, message: String },

    // ========================================================================
    // Bundle teardown
    // ========================================================================
    #[error("failed to remove both bundle and work directories: {path_err}; {work_err}")]
    BundleDelete {
        path_err: std::io::Error,
        work_err: std::io::Error,
    },

    // ========================================================================
    // External conversions
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // Misc
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error names a resource the caller asked for by id
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Whether the error is a duplicate-identifier rejection
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Remote error constructor helper
    pub fn remote(method: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Remote {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Transport error constructor helper
    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport(message.into())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates() {
        assert!(Error::NotFound("task x".into()).is_not_found());
        assert!(Error::Conflict("task x".into()).is_conflict());
        assert!(!Error::NamespaceRequired.is_conflict());
    }

    #[test]
    fn remote_display() {
        let err = Error::remote("create", "no such image");
        assert_eq!(err.to_string(), "Remote error: create - no such image");
    }
}

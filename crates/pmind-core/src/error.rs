//! Error types for PromptMind

use std::fmt;

use thiserror::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Whether a provider failure is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Network failure, timeout, overloaded endpoint
    Transient,
    /// Unknown model, rejected request, malformed response
    Permanent,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderErrorKind::Transient => write!(f, "transient"),
            ProviderErrorKind::Permanent => write!(f, "permanent"),
        }
    }
}

/// Core error types for the PromptMind pipeline
#[derive(Error, Debug)]
pub enum Error {
    #[error("Source unreachable: {location}: {message}")]
    SourceUnreachable { location: String, message: String },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Index not found at {path}: {reason}")]
    IndexNotFound { path: String, reason: String },

    #[error("Dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Provider error ({kind}): {message}")]
    Provider {
        kind: ProviderErrorKind,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn source_unreachable(location: impl Into<String>, message: impl Into<String>) -> Self {
        Error::SourceUnreachable {
            location: location.into(),
            message: message.into(),
        }
    }

    pub fn index_not_found(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::IndexNotFound {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Error::Provider {
            kind: ProviderErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Error::Provider {
            kind: ProviderErrorKind::Permanent,
            message: message.into(),
        }
    }

    /// True for provider failures that a retry may fix
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Provider {
                kind: ProviderErrorKind::Transient,
                ..
            }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

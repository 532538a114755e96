//! Error types for vismatch operations.
//!
//! This module provides a common `Error` type and `Result<T>` alias used across
//! all vismatch crates. Uses `thiserror` for derive macros.
//!
//! Errors are grouped by who should act on them:
//!
//! - Client errors (wrong query length, unreadable image) are the caller's fault.
//! - Unavailable errors (empty catalog) mean the service has nothing to match against.
//! - Everything else is an internal failure.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur in vismatch operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A vector of the wrong length was offered for storage or encoding.
    #[error("Dimension mismatch: expected {expected} elements, got {actual}")]
    Dimension {
        /// Configured dimension.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },

    /// A byte buffer could not be decoded into a vector.
    #[error("Malformed vector bytes: {0}")]
    Format(String),

    /// The query vector has the wrong length.
    #[error("Invalid query: expected {expected} elements, got {actual}")]
    InvalidQuery {
        /// Configured dimension.
        expected: usize,
        /// Length of the query.
        actual: usize,
    },

    /// The embedding provider failed.
    #[error("Embedding failed: {message}")]
    Embed {
        /// Provider-supplied description.
        message: String,
        /// Whether retrying the same input may succeed.
        transient: bool,
    },

    /// The catalog holds no embeddings at all.
    #[error("No embeddings in catalog; run ingestion first")]
    EmptyCatalog,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error with the path that caused it.
    #[error("I/O error at {}: {source}", path.display())]
    IoWithPath {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Embedded database error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Any other operational failure (poisoned lock, failed task join).
    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    /// Create a dimension mismatch error.
    pub fn dimension(expected: usize, actual: usize) -> Self {
        Self::Dimension { expected, actual }
    }

    /// Create a format error.
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Create an invalid query error.
    pub fn invalid_query(expected: usize, actual: usize) -> Self {
        Self::InvalidQuery { expected, actual }
    }

    /// Create a permanent embedding error (bad input, provider rejected it).
    pub fn embed(msg: impl Into<String>) -> Self {
        Self::Embed {
            message: msg.into(),
            transient: false,
        }
    }

    /// Create a transient embedding error (process failure, timeout, network).
    pub fn embed_transient(msg: impl Into<String>) -> Self {
        Self::Embed {
            message: msg.into(),
            transient: true,
        }
    }

    /// Create an I/O error that records the offending path.
    pub fn io_with_path(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Self::IoWithPath {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an operation error.
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }

    /// Whether the same request might succeed if attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Embed { transient: true, .. })
    }

    /// Whether the error was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidQuery { .. } | Self::Embed { transient: false, .. }
        )
    }

    /// Whether the service cannot answer because the catalog is empty.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::EmptyCatalog)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias using vismatch's Error type.
pub type Result<T> = std::result::Result<T, Error>;

//! Error types and handling for the docrank service
//!
//! This module defines all error types used throughout the system,
//! optimized for zero-cost error propagation and clear diagnostics.

use thiserror::Error;

/// Main result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the docrank service
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown document id. Never fatal; always reported to the caller.
    #[error("document not found: {0}")]
    NotFound(String),

    /// Rejected input, reported before any state is mutated
    #[error("validation error: {0}")]
    Validation(String),

    /// Content or snapshot read/write failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot file exists but cannot be parsed. Fatal at startup.
    #[error("corrupt snapshot: {0}")]
    SnapshotCorrupt(String),

    /// Serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Prometheus metrics errors
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl Error {
    /// Create a not-found error for a document id
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error is a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

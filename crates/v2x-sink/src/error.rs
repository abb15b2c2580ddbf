//! Error types for sinks.

use thiserror::Error;

/// Result type for sink operations.
pub type Result<T> = std::result::Result<T, SinkError>;

/// Errors that can occur while publishing records.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote store answered with a non-success status
    #[error("Sink rejected {path}: HTTP {status}")]
    Rejected { path: String, status: u16 },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid sink path or configuration
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The sink or publisher has been closed
    #[error("Sink closed")]
    Closed,

    /// The publication queue stayed full past the enqueue timeout
    #[error("Publish queue full; dropped record for {0}")]
    QueueFull(String),
}

impl From<rocksdb::Error> for SinkError {
    fn from(e: rocksdb::Error) -> Self {
        SinkError::Storage(e.to_string())
    }
}

impl SinkError {
    /// Whether retrying the same put could succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            SinkError::InvalidInput(_) | SinkError::Serialization(_) | SinkError::Closed
        )
    }
}

//! Error types for the data manager.

use thiserror::Error;

/// Result type for data manager operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the data manager.
///
/// Only configuration and startup errors leave the process boundary; per
/// datagram errors are logged and contained by the router.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid process configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid intersection configuration
    #[error("Intersection configuration error: {0}")]
    Intersections(#[from] v2x_spat::ConfigError),

    /// Reconciliation failure other than an unknown intersection
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] v2x_spat::Error),

    /// Undecodable datagram or missing required field
    #[error("Malformed message: {0}")]
    MalformedMessage(#[from] DecodeError),

    /// Sink error
    #[error("Sink error: {0}")]
    Sink(#[from] v2x_sink::SinkError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a datagram could not be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload is not UTF-8 text.
    #[error("datagram is not UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Payload is not a JSON document.
    #[error("datagram is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),

    /// The envelope has no string `MsgType`.
    #[error("message has no MsgType discriminator")]
    MissingType,

    /// A recognised message lacks required fields.
    #[error("{msg_type} message invalid: {source}")]
    Fields {
        msg_type: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

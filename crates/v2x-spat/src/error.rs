//! Error types for the SPaT core.

use thiserror::Error;

/// Result type for SPaT core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading the intersection configuration.
///
/// Every variant is fatal at startup: a process with a broken configuration
/// must not begin ingesting.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document has no top-level `intersections` array.
    #[error("config must contain an 'intersections' array")]
    MissingIntersections,

    /// An entry of the array is not a JSON object.
    #[error("entry {index} must be an object")]
    EntryNotObject { index: usize },

    /// An entry lacks `id` or `phases`.
    #[error("entry {index} missing '{field}'")]
    MissingField { index: usize, field: &'static str },

    /// The `id` field is neither a string nor an integer.
    #[error("entry {index} has an invalid 'id'")]
    InvalidId { index: usize },

    /// The id contains characters a key-path store cannot address.
    #[error("intersection id {0:?} must not contain '/', '.', '#', '$', '[' or ']'")]
    UnaddressableId(String),

    /// The `phases` field is empty or holds something other than positive integers.
    #[error("'phases' for id {id} {reason}")]
    InvalidPhases { id: String, reason: &'static str },

    /// Two entries share the same intersection id.
    #[error("duplicate intersection id {0}")]
    DuplicateId(String),

    /// The document is not valid JSON.
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The document could not be read.
    #[error("config IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while reconciling SPaT data.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The message references an intersection with no configuration entry.
    #[error("unknown intersection id: {0}")]
    UnknownIntersection(String),

    /// A snapshot handed to the store does not cover exactly the configured phases.
    #[error("snapshot for {intersection_id} has phases {actual:?}, expected {expected:?}")]
    IncompleteSnapshot {
        intersection_id: String,
        expected: Vec<u32>,
        actual: Vec<u32>,
    },
}

//! V2X Sink - persistence collaborators for published snapshots
//!
//! A sink is an opaque key-path document store reachable through
//! [`Sink::put`]. Sinks are constructed explicitly at startup and passed to
//! whoever publishes; there is no process-wide client.
//!
//! # Backends
//!
//! - [`RocksSink`]: local RocksDB store keyed by path
//! - [`RestSink`]: `PUT {base}/{path}.json` against a Firebase-RTDB-style REST API
//! - [`MemorySink`]: in-process map, for tests and dry runs
//!
//! # Publication
//!
//! [`Publisher`] decouples ingestion from sink latency: records go into a
//! bounded queue drained by a single worker that retries failed puts with
//! exponential backoff.

pub mod error;
pub mod http;
pub mod memory;
pub mod publisher;
pub mod rocks;

use async_trait::async_trait;
use serde_json::Value;

pub use error::{Result, SinkError};
pub use http::{RestSink, RestSinkConfig};
pub use memory::MemorySink;
pub use publisher::{
    PublishHandle, Publisher, PublisherConfig, PublisherStats, PublisherStatsSnapshot, RetryPolicy,
};
pub use rocks::RocksSink;

/// Path prefix for intersection snapshots.
pub const INTERSECTION_STATUS: &str = "intersection_status";

/// Path prefix for vehicle records.
pub const VEHICLE_STATUS: &str = "vehicle_status";

/// A key-path document store.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Store `record` at `path`, replacing whatever was there.
    async fn put(&self, path: &str, record: &Value) -> Result<()>;

    /// Flush and release the backend. Further puts may fail.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A record waiting to be published.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub path: String,
    pub body: Value,
}

impl Record {
    /// Create a record for an arbitrary path.
    pub fn new(path: impl Into<String>, body: Value) -> Self {
        Self {
            path: path.into(),
            body,
        }
    }

    /// Record under `intersection_status/{id}`.
    pub fn intersection(id: &str, body: Value) -> Self {
        Self::new(format!("{INTERSECTION_STATUS}/{id}"), body)
    }

    /// Record under `vehicle_status/{id}`.
    pub fn vehicle(id: &str, body: Value) -> Self {
        Self::new(format!("{VEHICLE_STATUS}/{id}"), body)
    }
}

/// Reject paths a key-path store cannot address.
///
/// Paths are `/`-separated, with no empty segments and none of `. # $ [ ]`.
pub fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(SinkError::InvalidInput("empty path".into()));
    }
    if path.split('/').any(str::is_empty) {
        return Err(SinkError::InvalidInput(format!("empty segment in {path:?}")));
    }
    if path.contains(['.', '#', '$', '[', ']']) {
        return Err(SinkError::InvalidInput(format!("illegal character in {path:?}")));
    }
    Ok(())
}

//! In-process sink for tests and dry runs.

use crate::error::{Result, SinkError};
use crate::{validate_path, Sink};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Sink that keeps every record in memory.
///
/// Keeps both the latest value per path and the full put log, and can be
/// told to fail the next few puts.
#[derive(Debug, Default)]
pub struct MemorySink {
    latest: Mutex<BTreeMap<String, Value>>,
    log: Mutex<Vec<(String, Value)>>,
    fail_next: AtomicUsize,
    closed: AtomicBool,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` puts fail with a storage error.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Latest record at `path`.
    pub fn get(&self, path: &str) -> Option<Value> {
        self.latest
            .lock()
            .ok()
            .and_then(|latest| latest.get(path).cloned())
    }

    /// Every successful put, in order.
    pub fn log(&self) -> Vec<(String, Value)> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Number of successful puts.
    pub fn put_count(&self) -> usize {
        self.log.lock().map(|log| log.len()).unwrap_or(0)
    }

    /// Whether [`Sink::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, path: &str, record: &Value) -> Result<()> {
        validate_path(path)?;
        if self.is_closed() {
            return Err(SinkError::Closed);
        }

        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(SinkError::Storage(format!("injected failure for {path}")));
        }

        let poisoned = || SinkError::Storage("memory sink lock poisoned".into());
        self.latest
            .lock()
            .map_err(|_| poisoned())?
            .insert(path.to_string(), record.clone());
        self.log
            .lock()
            .map_err(|_| poisoned())?
            .push((path.to_string(), record.clone()));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn keeps_latest_and_log() {
        let sink = MemorySink::new();
        sink.put("vehicle_status/1", &json!(1)).await.unwrap();
        sink.put("vehicle_status/1", &json!(2)).await.unwrap();

        assert_eq!(sink.get("vehicle_status/1"), Some(json!(2)));
        assert_eq!(sink.put_count(), 2);
    }

    #[tokio::test]
    async fn injected_failures_are_counted_down() {
        let sink = MemorySink::new();
        sink.fail_next(1);

        assert!(sink.put("vehicle_status/1", &json!(1)).await.is_err());
        assert!(sink.put("vehicle_status/1", &json!(1)).await.is_ok());
        assert_eq!(sink.put_count(), 1);
    }

    #[tokio::test]
    async fn closed_sink_rejects_puts() {
        let sink = MemorySink::new();
        sink.close().await.unwrap();
        assert!(matches!(
            sink.put("vehicle_status/1", &json!(1)).await,
            Err(SinkError::Closed)
        ));
    }
}

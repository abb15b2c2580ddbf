//! Buffered, retrying publication.
//!
//! The ingest loop hands records to a [`PublishHandle`]; a single worker task
//! drains a bounded queue into the sink. One worker means records for the same
//! path reach the sink in the order they were enqueued.
//!
//! Back-pressure: when the queue is full, `publish` waits up to the configured
//! enqueue timeout and then drops the record with a warning. A put that keeps
//! failing after the retry budget is logged and abandoned; nothing upstream is
//! rolled back.

use crate::error::{Result, SinkError};
use crate::{Record, Sink};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Exponential backoff for failed puts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_backoff: Duration,

    /// Upper bound on any single delay
    pub max_backoff: Duration,

    /// Growth factor between retries
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let millis = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_backoff.as_millis() as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

/// Configuration for a [`Publisher`].
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Queue capacity in records
    pub capacity: usize,

    /// Longest a publisher call may wait for queue space
    pub enqueue_timeout: Duration,

    /// Retry behaviour for failed puts
    pub retry: RetryPolicy,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            enqueue_timeout: Duration::from_millis(250),
            retry: RetryPolicy::default(),
        }
    }
}

/// Publication counters.
#[derive(Debug, Default)]
pub struct PublisherStats {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of [`PublisherStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PublisherStatsSnapshot {
    pub enqueued: u64,
    pub delivered: u64,
    pub retried: u64,
    pub failed: u64,
    pub dropped: u64,
}

impl PublisherStats {
    /// Read all counters.
    pub fn snapshot(&self) -> PublisherStatsSnapshot {
        PublisherStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Cloneable entry point for enqueuing records.
#[derive(Clone)]
pub struct PublishHandle {
    tx: mpsc::Sender<Record>,
    enqueue_timeout: Duration,
    stats: Arc<PublisherStats>,
}

impl PublishHandle {
    /// Enqueue `record`, waiting at most the enqueue timeout for space.
    pub async fn publish(&self, record: Record) -> Result<()> {
        match self.tx.send_timeout(record, self.enqueue_timeout).await {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(SendTimeoutError::Timeout(record)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(path = %record.path, "Publish queue full; dropping record");
                Err(SinkError::QueueFull(record.path))
            }
            Err(SendTimeoutError::Closed(record)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(path = %record.path, "Publisher closed; dropping record");
                Err(SinkError::Closed)
            }
        }
    }

    /// Shared counters.
    pub fn stats(&self) -> &Arc<PublisherStats> {
        &self.stats
    }
}

/// Owns the publication worker.
pub struct Publisher {
    handle: PublishHandle,
    shutdown_tx: oneshot::Sender<()>,
    worker: JoinHandle<()>,
}

impl Publisher {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(sink: Arc<dyn Sink>, config: PublisherConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let stats = Arc::new(PublisherStats::default());

        info!(
            sink = sink.name(),
            capacity = config.capacity,
            max_retries = config.retry.max_retries,
            "Publisher started"
        );

        let worker = tokio::spawn(run_worker(
            sink,
            rx,
            shutdown_rx,
            config.retry,
            Arc::clone(&stats),
        ));

        Self {
            handle: PublishHandle {
                tx,
                enqueue_timeout: config.enqueue_timeout,
                stats,
            },
            shutdown_tx,
            worker,
        }
    }

    /// A handle for enqueuing records.
    pub fn handle(&self) -> PublishHandle {
        self.handle.clone()
    }

    /// Stop accepting records, deliver what is queued, then close the sink.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(());
        drop(self.handle);
        self.worker.await.map_err(|e| SinkError::Storage(format!("publisher worker: {e}")))
    }
}

async fn run_worker(
    sink: Arc<dyn Sink>,
    mut rx: mpsc::Receiver<Record>,
    mut shutdown_rx: oneshot::Receiver<()>,
    retry: RetryPolicy,
    stats: Arc<PublisherStats>,
) {
    let mut closing = false;
    loop {
        let next = if closing {
            rx.recv().await
        } else {
            tokio::select! {
                next = rx.recv() => next,
                _ = &mut shutdown_rx => {
                    // Buffered records are still delivered after close().
                    rx.close();
                    closing = true;
                    continue;
                }
            }
        };
        let Some(record) = next else { break };
        deliver(sink.as_ref(), &record, &retry, &stats).await;
    }

    if let Err(e) = sink.close().await {
        error!(sink = sink.name(), error = %e, "Failed to close sink");
    }
    info!(sink = sink.name(), "Publisher stopped");
}

async fn deliver(sink: &dyn Sink, record: &Record, retry: &RetryPolicy, stats: &PublisherStats) {
    let mut attempt = 0;
    loop {
        match sink.put(&record.path, &record.body).await {
            Ok(()) => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(path = %record.path, attempts = attempt + 1, "Record published");
                return;
            }
            Err(e) if attempt < retry.max_retries && e.is_transient() => {
                let backoff = retry.backoff(attempt);
                stats.retried.fetch_add(1, Ordering::Relaxed);
                warn!(
                    path = %record.path,
                    attempt = attempt + 1,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Sink put failed; retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    path = %record.path,
                    attempts = attempt + 1,
                    error = %e,
                    "Sink put failed; record not published"
                );
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySink;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::Semaphore;

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            multiplier: 2.0,
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(20), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn delivers_in_order_then_closes_sink() {
        let sink = Arc::new(MemorySink::new());
        let publisher = Publisher::spawn(sink.clone(), PublisherConfig::default());
        let handle = publisher.handle();

        for i in 0..5 {
            handle
                .publish(Record::intersection("2351", json!({ "seq": i })))
                .await
                .unwrap();
        }
        publisher.shutdown().await.unwrap();

        let seqs: Vec<_> = sink.log().into_iter().map(|(_, v)| v["seq"].clone()).collect();
        assert_eq!(seqs, (0..5).map(|i| json!(i)).collect::<Vec<_>>());
        assert!(sink.is_closed());
        assert_eq!(handle.stats().snapshot().delivered, 5);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let sink = Arc::new(MemorySink::new());
        sink.fail_next(2);
        let config = PublisherConfig {
            retry: fast_retry(3),
            ..Default::default()
        };
        let publisher = Publisher::spawn(sink.clone(), config);
        let handle = publisher.handle();

        handle.publish(Record::vehicle("7", json!({"speed": 3.5}))).await.unwrap();
        publisher.shutdown().await.unwrap();

        assert_eq!(sink.get("vehicle_status/7"), Some(json!({"speed": 3.5})));
        let stats = handle.stats().snapshot();
        assert_eq!(stats.retried, 2);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn gives_up_after_retry_budget() {
        let sink = Arc::new(MemorySink::new());
        sink.fail_next(10);
        let config = PublisherConfig {
            retry: fast_retry(1),
            ..Default::default()
        };
        let publisher = Publisher::spawn(sink.clone(), config);
        let handle = publisher.handle();

        handle.publish(Record::vehicle("7", json!({}))).await.unwrap();
        handle.publish(Record::vehicle("8", json!({}))).await.unwrap();
        publisher.shutdown().await.unwrap();

        let stats = handle.stats().snapshot();
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.delivered, 0);
        assert_eq!(sink.put_count(), 0);
    }

    #[tokio::test]
    async fn invalid_paths_are_not_retried() {
        let sink = Arc::new(MemorySink::new());
        let publisher = Publisher::spawn(sink.clone(), PublisherConfig::default());
        let handle = publisher.handle();

        handle.publish(Record::new("bad/path.", json!({}))).await.unwrap();
        publisher.shutdown().await.unwrap();

        let stats = handle.stats().snapshot();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.retried, 0);
    }

    /// Sink whose puts block until a permit is released.
    struct GatedSink {
        gate: Semaphore,
        inner: MemorySink,
    }

    #[async_trait]
    impl Sink for GatedSink {
        fn name(&self) -> &'static str {
            "gated"
        }

        async fn put(&self, path: &str, record: &Value) -> Result<()> {
            let permit = self.gate.acquire().await.map_err(|_| SinkError::Closed)?;
            permit.forget();
            self.inner.put(path, record).await
        }
    }

    #[tokio::test]
    async fn full_queue_drops_after_timeout() {
        let sink = Arc::new(GatedSink {
            gate: Semaphore::new(0),
            inner: MemorySink::new(),
        });
        let config = PublisherConfig {
            capacity: 1,
            enqueue_timeout: Duration::from_millis(50),
            retry: RetryPolicy::none(),
        };
        let publisher = Publisher::spawn(sink.clone(), config);
        let handle = publisher.handle();

        // First record is taken by the worker and blocks in put; second fills the queue.
        handle.publish(Record::vehicle("1", json!(1))).await.unwrap();
        handle.publish(Record::vehicle("2", json!(2))).await.unwrap();
        let err = handle.publish(Record::vehicle("3", json!(3))).await.unwrap_err();
        assert!(matches!(err, SinkError::QueueFull(path) if path == "vehicle_status/3"));

        sink.gate.add_permits(2);
        publisher.shutdown().await.unwrap();

        let stats = handle.stats().snapshot();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.delivered, 2);
        assert_eq!(sink.inner.get("vehicle_status/3"), None);
    }

    #[tokio::test]
    async fn publish_after_shutdown_is_rejected() {
        let sink = Arc::new(MemorySink::new());
        let publisher = Publisher::spawn(sink, PublisherConfig::default());
        let handle = publisher.handle();
        publisher.shutdown().await.unwrap();

        let err = handle.publish(Record::vehicle("1", json!(1))).await.unwrap_err();
        assert!(matches!(err, SinkError::Closed));
    }
}

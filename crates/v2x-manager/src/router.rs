//! Ingestion and dispatch.
//!
//! One datagram at a time: decode into an [`Envelope`], hand SPaT to the
//! engine and BSM to the [`BsmHandler`], publish the result. Every failure is
//! contained here and reported as an [`Outcome`]; nothing a datagram carries
//! can stop the ingest loop.

use crate::bsm::BsmHandler;
use crate::envelope::Envelope;
use crate::error::{DecodeError, Error};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use v2x_sink::{PublishHandle, Record, SinkError};
use v2x_spat::clock::now_millis;
use v2x_spat::{Reconciliation, SpatEngine, SpatMessage};

/// Engine shared between the ingest loop and status readers.
pub type SharedEngine = Arc<RwLock<SpatEngine>>;

/// What happened to one datagram.
#[derive(Debug)]
pub enum Outcome {
    /// SPaT reconciled into the store; `published` is false when the record
    /// could not be enqueued.
    Reconciled {
        reconciliation: Reconciliation,
        published: bool,
    },
    /// BSM handed to the publisher.
    VehicleForwarded { vehicle_id: String },
    /// Valid envelope with a type this node does not handle.
    Unrecognized(String),
    /// Undecodable datagram.
    Malformed(DecodeError),
    /// SPaT for an intersection with no configuration entry.
    UnknownIntersection(String),
    /// Anything else that stopped the datagram.
    Failed(Error),
}

/// Router counters.
#[derive(Debug, Default)]
pub struct RouterStats {
    received: AtomicU64,
    spat: AtomicU64,
    bsm: AtomicU64,
    unrecognized: AtomicU64,
    malformed: AtomicU64,
    unknown_intersection: AtomicU64,
    publish_dropped: AtomicU64,
}

/// Point-in-time copy of [`RouterStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouterStatsSnapshot {
    pub received: u64,
    pub spat: u64,
    pub bsm: u64,
    pub unrecognized: u64,
    pub malformed: u64,
    pub unknown_intersection: u64,
    pub publish_dropped: u64,
}

impl RouterStats {
    /// Read all counters.
    pub fn snapshot(&self) -> RouterStatsSnapshot {
        RouterStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            spat: self.spat.load(Ordering::Relaxed),
            bsm: self.bsm.load(Ordering::Relaxed),
            unrecognized: self.unrecognized.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            unknown_intersection: self.unknown_intersection.load(Ordering::Relaxed),
            publish_dropped: self.publish_dropped.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Routes decoded datagrams to their handlers.
pub struct Router {
    engine: SharedEngine,
    publisher: PublishHandle,
    bsm: BsmHandler,
    stats: Arc<RouterStats>,
}

impl Router {
    /// Create a router over `engine` publishing through `publisher`.
    pub fn new(engine: SharedEngine, publisher: PublishHandle) -> Self {
        Self {
            engine,
            bsm: BsmHandler::new(publisher.clone()),
            publisher,
            stats: Arc::new(RouterStats::default()),
        }
    }

    /// Shared counters.
    pub fn stats(&self) -> Arc<RouterStats> {
        Arc::clone(&self.stats)
    }

    /// Decode and fully handle one datagram.
    pub async fn dispatch(&self, datagram: &[u8]) -> Outcome {
        RouterStats::bump(&self.stats.received);

        let envelope = match Envelope::decode(datagram) {
            Ok(envelope) => envelope,
            Err(e) => {
                RouterStats::bump(&self.stats.malformed);
                warn!(len = datagram.len(), error = %e, "Dropping malformed datagram");
                return Outcome::Malformed(e);
            }
        };

        match envelope {
            Envelope::Spat(message) => self.handle_spat(&message).await,
            Envelope::Bsm(message) => {
                let vehicle_id = message.vehicle_id().to_string();
                match self.bsm.handle(&message, now_millis()).await {
                    Ok(()) => {
                        RouterStats::bump(&self.stats.bsm);
                        Outcome::VehicleForwarded { vehicle_id }
                    }
                    Err(e) => {
                        if matches!(e, Error::Sink(SinkError::QueueFull(_) | SinkError::Closed)) {
                            RouterStats::bump(&self.stats.publish_dropped);
                        }
                        error!(vehicle_id = %vehicle_id, error = %e, "Failed to forward BSM");
                        Outcome::Failed(e)
                    }
                }
            }
            Envelope::Unrecognized(kind) => {
                RouterStats::bump(&self.stats.unrecognized);
                info!(msg_type = %kind, "Ignoring unrecognized message type");
                Outcome::Unrecognized(kind)
            }
        }
    }

    async fn handle_spat(&self, message: &SpatMessage) -> Outcome {
        // The write guard is dropped before publishing so status readers never
        // wait on the sink queue.
        let result = {
            let mut engine = self.engine.write().await;
            engine.process_at(message, now_millis())
        };

        let reconciliation = match result {
            Ok(reconciliation) => reconciliation,
            Err(v2x_spat::Error::UnknownIntersection(id)) => {
                RouterStats::bump(&self.stats.unknown_intersection);
                warn!(intersection_id = %id, "Dropping SPaT for unknown intersection");
                return Outcome::UnknownIntersection(id);
            }
            Err(e) => {
                error!(
                    intersection_id = %message.intersection_id(),
                    error = %e,
                    "SPaT reconciliation failed"
                );
                return Outcome::Failed(e.into());
            }
        };
        RouterStats::bump(&self.stats.spat);

        let snapshot = &reconciliation.snapshot;
        let body = match snapshot.to_record() {
            Ok(body) => body,
            Err(e) => {
                error!(intersection_id = %snapshot.intersection_id, error = %e, "Cannot serialize snapshot");
                return Outcome::Failed(e.into());
            }
        };

        let published = match self
            .publisher
            .publish(Record::intersection(&snapshot.intersection_id, body))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                RouterStats::bump(&self.stats.publish_dropped);
                error!(intersection_id = %snapshot.intersection_id, error = %e, "Snapshot not published");
                false
            }
        };

        if reconciliation.is_clean() {
            debug!(intersection_id = %snapshot.intersection_id, published, "SPaT dispatched");
        } else {
            debug!(
                intersection_id = %snapshot.intersection_id,
                extras = ?reconciliation.extras,
                missing = ?reconciliation.missing,
                published,
                "SPaT dispatched with anomalies"
            );
        }

        Outcome::Reconciled {
            reconciliation,
            published,
        }
    }
}

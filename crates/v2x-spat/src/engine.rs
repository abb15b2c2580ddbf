//! The reconciliation engine: sole writer of the intersection store.

use crate::clock::now_millis;
use crate::config::IntersectionRegistry;
use crate::error::Result;
use crate::message::SpatMessage;
use crate::reconcile::{Reconciler, Reconciliation};
use crate::store::IntersectionStore;
use std::sync::Arc;
use tracing::debug;

/// Reconciles SPaT messages and merges the results into the store.
///
/// Owns the [`IntersectionStore`]; other components only see it through
/// [`store`](Self::store). When shared across tasks, wrap the engine in a
/// lock so writes to the same intersection stay serialized.
#[derive(Debug)]
pub struct SpatEngine {
    reconciler: Reconciler,
    store: IntersectionStore,
}

impl SpatEngine {
    /// Create an engine with the store seeded at the current time.
    pub fn new(registry: Arc<IntersectionRegistry>) -> Self {
        Self::with_start_time(registry, now_millis())
    }

    /// Create an engine with the store seeded at `start_ms`.
    pub fn with_start_time(registry: Arc<IntersectionRegistry>, start_ms: i64) -> Self {
        let store = IntersectionStore::new(&registry, start_ms);
        Self {
            reconciler: Reconciler::new(registry),
            store,
        }
    }

    /// Reconcile `message` at the current wall-clock time and apply it.
    pub fn process(&mut self, message: &SpatMessage) -> Result<Reconciliation> {
        self.process_at(message, now_millis())
    }

    /// Reconcile `message` stamped with `now_ms` and apply it.
    ///
    /// On error the store is left untouched.
    pub fn process_at(&mut self, message: &SpatMessage, now_ms: i64) -> Result<Reconciliation> {
        let reconciliation = self.reconciler.reconcile(message, now_ms)?;
        self.store.apply(&reconciliation.snapshot)?;
        debug!(
            intersection_id = %reconciliation.snapshot.intersection_id,
            timestamp_ms = now_ms,
            "Intersection snapshot updated"
        );
        Ok(reconciliation)
    }

    /// Read access to the store.
    pub fn store(&self) -> &IntersectionStore {
        &self.store
    }

    /// The shared configuration.
    pub fn registry(&self) -> &IntersectionRegistry {
        self.reconciler.registry()
    }
}

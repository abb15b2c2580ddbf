//! In-memory intersection state store.

use crate::config::IntersectionRegistry;
use crate::error::{Error, Result};
use crate::snapshot::IntersectionSnapshot;
use std::collections::BTreeMap;

/// Latest snapshot per configured intersection.
///
/// Seeded with one entry per configured intersection at startup. Entries are
/// never added or removed afterwards; [`apply`](Self::apply) only overwrites
/// the timestamp and phase states of an existing entry, and only when the
/// incoming phase list matches the stored one exactly.
#[derive(Debug, Clone, Default)]
pub struct IntersectionStore {
    snapshots: BTreeMap<String, IntersectionSnapshot>,
}

impl IntersectionStore {
    /// Seed the store from configuration, stamping every entry with `start_ms`.
    pub fn new(registry: &IntersectionRegistry, start_ms: i64) -> Self {
        let snapshots = registry
            .iter()
            .map(|cfg| (cfg.id.clone(), IntersectionSnapshot::initial(cfg, start_ms)))
            .collect();
        Self { snapshots }
    }

    /// Snapshot for one intersection.
    pub fn get(&self, id: &str) -> Option<&IntersectionSnapshot> {
        self.snapshots.get(id)
    }

    /// All snapshots keyed by intersection id.
    pub fn get_all(&self) -> &BTreeMap<String, IntersectionSnapshot> {
        &self.snapshots
    }

    /// Iterate over snapshots in id order.
    pub fn iter(&self) -> impl Iterator<Item = &IntersectionSnapshot> {
        self.snapshots.values()
    }

    /// Number of intersections held.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Merge a reconciled snapshot into its existing entry.
    pub(crate) fn apply(&mut self, snapshot: &IntersectionSnapshot) -> Result<()> {
        let entry = self
            .snapshots
            .get_mut(&snapshot.intersection_id)
            .ok_or_else(|| Error::UnknownIntersection(snapshot.intersection_id.clone()))?;

        if !entry.phases().eq(snapshot.phases()) {
            return Err(Error::IncompleteSnapshot {
                intersection_id: snapshot.intersection_id.clone(),
                expected: entry.phases().collect(),
                actual: snapshot.phases().collect(),
            });
        }

        entry.timestamp_ms = snapshot.timestamp_ms;
        entry.phase_states.clone_from(&snapshot.phase_states);
        Ok(())
    }
}

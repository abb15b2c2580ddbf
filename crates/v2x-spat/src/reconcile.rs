//! SPaT reconciliation.
//!
//! Turns one raw SPaT message into a complete [`IntersectionSnapshot`] for a
//! configured intersection:
//!
//! - phases reported but not configured (`extras`) are dropped
//! - phases configured but not reported (`missing`) are filled with
//!   [`PhaseState::unknown`]
//! - output follows the configured phase order, never the wire order
//!
//! Both anomaly sets are logged as warnings and returned to the caller; neither
//! is an error.

use crate::config::{IntersectionRegistry, PhaseNumber};
use crate::error::{Error, Result};
use crate::message::{PhaseObservation, SpatMessage};
use crate::snapshot::{IntersectionSnapshot, PhaseState};
use crate::state::{canonicalize, UNKNOWN_TOKEN};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Output of reconciling one message.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// The canonical snapshot.
    pub snapshot: IntersectionSnapshot,

    /// Reported phases absent from configuration (ascending).
    pub extras: Vec<i64>,

    /// Configured phases absent from the message (ascending).
    pub missing: Vec<PhaseNumber>,
}

impl Reconciliation {
    /// True when the message matched the configuration exactly.
    pub fn is_clean(&self) -> bool {
        self.extras.is_empty() && self.missing.is_empty()
    }
}

/// Stateless reconciler over the shared configuration.
#[derive(Debug, Clone)]
pub struct Reconciler {
    registry: Arc<IntersectionRegistry>,
}

impl Reconciler {
    /// Create a reconciler over `registry`.
    pub fn new(registry: Arc<IntersectionRegistry>) -> Self {
        Self { registry }
    }

    /// The configuration this reconciler validates against.
    pub fn registry(&self) -> &IntersectionRegistry {
        &self.registry
    }

    /// Reconcile `message`, stamping the snapshot with `now_ms`.
    pub fn reconcile(&self, message: &SpatMessage, now_ms: i64) -> Result<Reconciliation> {
        let intersection_id = message.intersection_id();
        let config = self
            .registry
            .get(intersection_id)
            .ok_or_else(|| Error::UnknownIntersection(intersection_id.to_string()))?;

        // Last observation wins on duplicate phase numbers.
        let mut incoming: HashMap<i64, &PhaseObservation> = HashMap::new();
        for observation in message.observations() {
            incoming.insert(observation.phase_no, observation);
        }

        let mut extras: Vec<i64> = incoming
            .keys()
            .copied()
            .filter(|phase| !config.has_phase(*phase))
            .collect();
        extras.sort_unstable();
        if !extras.is_empty() {
            warn!(
                intersection_id = %intersection_id,
                extras = ?extras,
                "SPaT contains unconfigured phases; ignoring"
            );
        }

        let mut missing = Vec::new();
        let phase_states = config
            .phases()
            .iter()
            .map(|&phase| match incoming.get(&i64::from(phase)) {
                Some(observation) => PhaseState {
                    phase,
                    state: canonicalize(observation.curr_state.as_deref().unwrap_or(UNKNOWN_TOKEN)),
                    min_end_time: observation.min_end_time,
                    max_end_time: observation.max_end_time,
                },
                None => {
                    missing.push(phase);
                    PhaseState::unknown(phase)
                }
            })
            .collect();
        if !missing.is_empty() {
            warn!(
                intersection_id = %intersection_id,
                missing = ?missing,
                "SPaT missing configured phases; filling as stopAndRemain"
            );
        }

        Ok(Reconciliation {
            snapshot: IntersectionSnapshot {
                intersection_id: config.id.clone(),
                name: config.name.clone(),
                timestamp_ms: now_ms,
                phase_states,
            },
            extras,
            missing,
        })
    }
}

//! Canonical intersection snapshots.

use crate::config::{IntersectionConfig, PhaseNumber};
use crate::state::CanonicalState;
use serde::{Deserialize, Serialize};

/// Canonical state of one configured phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseState {
    pub phase: PhaseNumber,
    pub state: CanonicalState,
    pub min_end_time: Option<f64>,
    pub max_end_time: Option<f64>,
}

impl PhaseState {
    /// The fallback for a phase nothing has been heard about.
    pub fn unknown(phase: PhaseNumber) -> Self {
        Self {
            phase,
            state: CanonicalState::StopAndRemain,
            min_end_time: None,
            max_end_time: None,
        }
    }
}

/// Latest canonical state of one intersection.
///
/// `phase_states` always lists exactly the configured phases, in configured
/// (ascending) order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntersectionSnapshot {
    pub intersection_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Wall-clock milliseconds at which the snapshot was produced.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,

    pub phase_states: Vec<PhaseState>,
}

impl IntersectionSnapshot {
    /// Startup snapshot: every configured phase at its fallback state.
    pub fn initial(config: &IntersectionConfig, timestamp_ms: i64) -> Self {
        Self {
            intersection_id: config.id.clone(),
            name: config.name.clone(),
            timestamp_ms,
            phase_states: config.phases().iter().copied().map(PhaseState::unknown).collect(),
        }
    }

    /// Phase numbers in snapshot order.
    pub fn phases(&self) -> impl Iterator<Item = PhaseNumber> + '_ {
        self.phase_states.iter().map(|p| p.phase)
    }

    /// State of a single phase.
    pub fn phase(&self, phase: PhaseNumber) -> Option<&PhaseState> {
        self.phase_states.iter().find(|p| p.phase == phase)
    }

    /// JSON record handed to the sink.
    pub fn to_record(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn initial_snapshot_defaults_all_phases() {
        let cfg = IntersectionConfig::new("2351", Some("Main".into()), [6, 2, 4]).unwrap();
        let snap = IntersectionSnapshot::initial(&cfg, 1_000);

        assert_eq!(snap.phases().collect::<Vec<_>>(), vec![2, 4, 6]);
        assert!(snap
            .phase_states
            .iter()
            .all(|p| p.state == CanonicalState::StopAndRemain && p.min_end_time.is_none()));
        assert_eq!(snap.timestamp_ms, 1_000);
    }

    #[test]
    fn record_shape() {
        let cfg = IntersectionConfig::new("2351", None, [2]).unwrap();
        let mut snap = IntersectionSnapshot::initial(&cfg, 42);
        snap.phase_states[0].min_end_time = Some(12.5);

        let record = snap.to_record().unwrap();
        assert_eq!(
            record,
            json!({
                "intersectionId": "2351",
                "timestamp": 42,
                "phaseStates": [
                    {"phase": 2, "state": "stopAndRemain", "minEndTime": 12.5, "maxEndTime": null}
                ]
            })
        );
    }
}

//! SPaT wire model.
//!
//! Only the fields reconciliation needs are modelled; everything else the
//! decoder emits (`msgCnt`, `minuteOfYear`, `regionalID`, ...) is ignored.

use crate::config::id_to_string;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// A decoded SPaT message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpatMessage {
    #[serde(rename = "Spat")]
    pub spat: SpatBody,

    /// Sender-side POSIX timestamp (seconds), when present.
    #[serde(rename = "Timestamp_posix", default)]
    pub timestamp_posix: Option<f64>,
}

/// Body of a SPaT message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpatBody {
    #[serde(rename = "intersectionState")]
    pub intersection_state: IntersectionState,

    #[serde(rename = "phaseState")]
    pub phase_state: Vec<PhaseObservation>,
}

/// Intersection identification block.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IntersectionState {
    #[serde(rename = "intersectionID", deserialize_with = "de_intersection_id")]
    pub intersection_id: String,
}

/// One reported phase.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PhaseObservation {
    #[serde(rename = "phaseNo", deserialize_with = "de_phase_no")]
    pub phase_no: i64,

    #[serde(rename = "currState", default, deserialize_with = "de_state_token")]
    pub curr_state: Option<String>,

    #[serde(rename = "minEndTime", default, deserialize_with = "de_end_time")]
    pub min_end_time: Option<f64>,

    #[serde(rename = "maxEndTime", default, deserialize_with = "de_end_time")]
    pub max_end_time: Option<f64>,
}

impl SpatMessage {
    /// Build a message directly (tests, replay tools).
    pub fn new(intersection_id: impl Into<String>, phase_state: Vec<PhaseObservation>) -> Self {
        Self {
            spat: SpatBody {
                intersection_state: IntersectionState {
                    intersection_id: intersection_id.into(),
                },
                phase_state,
            },
            timestamp_posix: None,
        }
    }

    /// Decode from an already-parsed JSON envelope.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Intersection the message reports on.
    pub fn intersection_id(&self) -> &str {
        &self.spat.intersection_state.intersection_id
    }

    /// Reported phases in wire order.
    pub fn observations(&self) -> &[PhaseObservation] {
        &self.spat.phase_state
    }
}

impl PhaseObservation {
    /// Observation with a state and no end times.
    pub fn new(phase_no: i64, curr_state: impl Into<String>) -> Self {
        Self {
            phase_no,
            curr_state: Some(curr_state.into()),
            min_end_time: None,
            max_end_time: None,
        }
    }

    /// Set the reported end times.
    #[must_use]
    pub fn with_end_times(mut self, min_end_time: Option<f64>, max_end_time: Option<f64>) -> Self {
        self.min_end_time = min_end_time;
        self.max_end_time = max_end_time;
        self
    }
}

fn de_intersection_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value = Value::deserialize(d)?;
    id_to_string(&value).ok_or_else(|| D::Error::custom(format!("invalid intersectionID: {value}")))
}

// Decoders emit `phaseNo` as an integer, but some replay files carry it as a string.
fn de_phase_no<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| D::Error::custom(format!("phaseNo is not an integer: {n}"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("phaseNo is not an integer: {s:?}"))),
        other => Err(D::Error::custom(format!("invalid phaseNo: {other}"))),
    }
}

// A phase with an odd state value still belongs to the message: numbers and
// booleans are stringified, anything else reads as absent and canonicalizes
// to the fallback state.
fn de_state_token<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

// Numbers pass through, numeric strings are parsed, anything else is null.
fn de_end_time<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

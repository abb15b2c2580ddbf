//! Basic Safety Message forwarding.
//!
//! BSMs are not reconciled. Each one is flattened into a vehicle record and
//! published at `vehicle_status/{temporaryID}`, replacing the previous record
//! for that vehicle.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;
use v2x_sink::{PublishHandle, Record};

/// A decoded BSM.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BsmMessage {
    #[serde(rename = "BasicVehicle")]
    pub basic_vehicle: BasicVehicle,
}

/// Vehicle block of a BSM.
///
/// Lane, approach and signal group must be present but may be null when the
/// vehicle is not mapped onto an intersection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BasicVehicle {
    #[serde(rename = "temporaryID", deserialize_with = "de_temporary_id")]
    pub temporary_id: String,

    pub position: Position,

    #[serde(rename = "speed_MeterPerSecond")]
    pub speed_mps: f64,

    #[serde(rename = "heading_Degree")]
    pub heading_deg: f64,

    #[serde(rename = "laneID", deserialize_with = "nullable")]
    pub lane_id: Option<i64>,

    #[serde(rename = "approachID", deserialize_with = "nullable")]
    pub approach_id: Option<i64>,

    #[serde(rename = "signalGroup", deserialize_with = "nullable")]
    pub signal_group: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Position {
    #[serde(rename = "latitude_DecimalDegree")]
    pub latitude: f64,

    #[serde(rename = "longitude_DecimalDegree")]
    pub longitude: f64,

    #[serde(rename = "elevation_Meter")]
    pub elevation: f64,
}

/// Record published for one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleRecord {
    pub lat: f64,
    pub lon: f64,
    pub elev: f64,
    pub speed: f64,
    pub heading: f64,
    pub lane_id: Option<i64>,
    pub approach_id: Option<i64>,
    pub signal_group: Option<i64>,
    /// Receipt wall-clock time in milliseconds
    pub timestamp: i64,
}

impl BsmMessage {
    /// Decode from an already-parsed JSON envelope.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Vehicle the message describes.
    pub fn vehicle_id(&self) -> &str {
        &self.basic_vehicle.temporary_id
    }

    /// Flatten into the published record.
    pub fn to_record(&self, now_ms: i64) -> VehicleRecord {
        let v = &self.basic_vehicle;
        VehicleRecord {
            lat: v.position.latitude,
            lon: v.position.longitude,
            elev: v.position.elevation,
            speed: v.speed_mps,
            heading: v.heading_deg,
            lane_id: v.lane_id,
            approach_id: v.approach_id,
            signal_group: v.signal_group,
            timestamp: now_ms,
        }
    }
}

/// Publishes vehicle records.
#[derive(Clone)]
pub struct BsmHandler {
    publisher: PublishHandle,
}

impl BsmHandler {
    pub fn new(publisher: PublishHandle) -> Self {
        Self { publisher }
    }

    /// Sink record for `message` received at `now_ms`.
    pub fn record(message: &BsmMessage, now_ms: i64) -> serde_json::Result<Record> {
        let body = serde_json::to_value(message.to_record(now_ms))?;
        Ok(Record::vehicle(message.vehicle_id(), body))
    }

    /// Enqueue the vehicle record for publication.
    pub async fn handle(&self, message: &BsmMessage, now_ms: i64) -> crate::Result<()> {
        let record = Self::record(message, now_ms)?;
        debug!(vehicle_id = %message.vehicle_id(), "Forwarding BSM");
        self.publisher.publish(record).await?;
        Ok(())
    }
}

fn de_temporary_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::Number(n) if n.is_u64() || n.is_i64() => Ok(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        other => Err(D::Error::custom(format!("invalid temporaryID: {other}"))),
    }
}

// Required key, nullable value.
fn nullable<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Option::<i64>::deserialize(d)
}

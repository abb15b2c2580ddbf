//! V2X Data Manager
//!
//! Receives V2X messages over UDP and routes them by `MsgType`:
//!
//! - **SPaT**: reconciled against the intersection configuration, merged into
//!   the in-memory store and published at `intersection_status/{id}`
//! - **BSM**: flattened into a vehicle record and published at
//!   `vehicle_status/{temporaryID}`
//! - anything else: logged and dropped
//!
//! Per-datagram failures never stop the ingest loop. Only configuration and
//! startup errors surface to the caller.

pub mod bsm;
pub mod config;
pub mod envelope;
pub mod error;
pub mod node;
pub mod router;
pub mod status_socket;

pub use bsm::{BsmHandler, BsmMessage, VehicleRecord};
pub use config::{ManagerConfig, SinkKind};
pub use envelope::{Envelope, MAX_DATAGRAM};
pub use error::{DecodeError, Error, Result};
pub use node::{open_sink, shutdown_signal, ManagerNode};
pub use router::{Outcome, Router, RouterStats, RouterStatsSnapshot, SharedEngine};
pub use status_socket::{StatusCommand, StatusResponse, StatusSocket};

//! V2X SPaT core
//!
//! Normalizes Signal Phase and Timing (SPaT) reports against a static
//! per-intersection configuration and keeps the latest canonical snapshot of
//! every configured intersection.
//!
//! # Architecture
//!
//! - **Config**: intersection id to ordered phase set and display name
//! - **State**: vendor phase-state token to canonical state
//! - **Reconcile**: raw message to complete snapshot, with anomaly reporting
//! - **Store**: latest snapshot per intersection
//! - **Engine**: reconcile + store update, the store's only writer
//!
//! This crate does no I/O beyond reading the configuration file.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use v2x_spat::{IntersectionRegistry, PhaseObservation, SpatEngine, SpatMessage};
//!
//! let registry = IntersectionRegistry::from_json_str(
//!     r#"{"intersections": [{"id": 2351, "phases": [2, 4, 6]}]}"#,
//! ).unwrap();
//! let mut engine = SpatEngine::new(Arc::new(registry));
//!
//! let msg = SpatMessage::new("2351", vec![PhaseObservation::new(2, "protected_green")]);
//! let result = engine.process(&msg).unwrap();
//! assert_eq!(result.missing, vec![4, 6]);
//! ```

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod message;
pub mod reconcile;
pub mod snapshot;
pub mod state;
pub mod store;

pub use config::{IntersectionConfig, IntersectionRegistry, PhaseNumber};
pub use engine::SpatEngine;
pub use error::{ConfigError, Error, Result};
pub use message::{PhaseObservation, SpatMessage};
pub use reconcile::{Reconciler, Reconciliation};
pub use snapshot::{IntersectionSnapshot, PhaseState};
pub use state::{canonicalize, CanonicalState};
pub use store::IntersectionStore;

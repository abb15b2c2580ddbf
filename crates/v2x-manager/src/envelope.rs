//! Datagram decoding.
//!
//! Every datagram carries one JSON object with a string `MsgType`. Decoding
//! turns it into an [`Envelope`] so dispatch is an exhaustive match rather
//! than a string comparison chain.

use crate::bsm::BsmMessage;
use crate::error::DecodeError;
use serde_json::Value;
use v2x_spat::SpatMessage;

/// Largest datagram the ingest loop reads.
pub const MAX_DATAGRAM: usize = 4096;

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Signal Phase and Timing
    Spat(SpatMessage),
    /// Basic Safety Message
    Bsm(BsmMessage),
    /// Well-formed envelope with a type this manager does not handle
    Unrecognized(String),
}

impl Envelope {
    /// `MsgType` value for SPaT.
    pub const SPAT: &'static str = "SPaT";

    /// `MsgType` value for BSM.
    pub const BSM: &'static str = "BSM";

    /// Decode a datagram.
    pub fn decode(datagram: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(datagram)?;
        let value: Value = serde_json::from_str(text).map_err(DecodeError::Json)?;
        Self::from_value(value)
    }

    /// Classify an already-parsed message.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let msg_type = value
            .get("MsgType")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingType)?;

        match msg_type {
            Self::SPAT => SpatMessage::from_value(value)
                .map(Envelope::Spat)
                .map_err(|source| DecodeError::Fields {
                    msg_type: Self::SPAT,
                    source,
                }),
            Self::BSM => BsmMessage::from_value(value)
                .map(Envelope::Bsm)
                .map_err(|source| DecodeError::Fields {
                    msg_type: Self::BSM,
                    source,
                }),
            other => Ok(Envelope::Unrecognized(other.to_string())),
        }
    }

    /// Discriminator of this message.
    pub fn kind(&self) -> &str {
        match self {
            Envelope::Spat(_) => Self::SPAT,
            Envelope::Bsm(_) => Self::BSM,
            Envelope::Unrecognized(kind) => kind,
        }
    }
}

//! Phase state canonicalization.
//!
//! Controllers report J2735-style lower-case tokens (`protected_green`,
//! `flashing_yellow`, ...). Downstream consumers only understand four states.
//! Anything unrecognised maps to [`CanonicalState::StopAndRemain`]: an unknown
//! signal must never be reported as permissive.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The canonical signal vocabulary published to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum CanonicalState {
    #[default]
    StopAndRemain,
    PermissiveMovementAllowed,
    ProtectedMovementAllowed,
    Yellow,
}

impl CanonicalState {
    /// Wire name of the state.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::StopAndRemain => "stopAndRemain",
            Self::PermissiveMovementAllowed => "permissiveMovementAllowed",
            Self::ProtectedMovementAllowed => "protectedMovementAllowed",
            Self::Yellow => "yellow",
        }
    }
}

impl fmt::Display for CanonicalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw token reported when a controller omits the state.
pub const UNKNOWN_TOKEN: &str = "unknown";

/// Vendor token to canonical state table.
pub const STATE_MAP: [(&str, CanonicalState); 9] = [
    ("red", CanonicalState::StopAndRemain),
    ("permissive_green", CanonicalState::PermissiveMovementAllowed),
    ("protected_green", CanonicalState::ProtectedMovementAllowed),
    ("permissive_yellow", CanonicalState::Yellow),
    ("protected_yellow", CanonicalState::Yellow),
    ("dark", CanonicalState::StopAndRemain),
    ("flashing_red", CanonicalState::StopAndRemain),
    ("flashing_yellow", CanonicalState::Yellow),
    (UNKNOWN_TOKEN, CanonicalState::StopAndRemain),
];

/// Map a raw state token to its canonical state.
///
/// Lookup ignores case and surrounding whitespace, and treats `-` as `_`.
/// Never fails.
pub fn canonicalize(raw: &str) -> CanonicalState {
    let token = raw.trim().to_ascii_lowercase().replace('-', "_");
    STATE_MAP
        .iter()
        .find(|(name, _)| *name == token)
        .map(|(_, state)| *state)
        .unwrap_or(CanonicalState::StopAndRemain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_tokens() {
        assert_eq!(canonicalize("red"), CanonicalState::StopAndRemain);
        assert_eq!(
            canonicalize("permissive_green"),
            CanonicalState::PermissiveMovementAllowed
        );
        assert_eq!(
            canonicalize("protected_green"),
            CanonicalState::ProtectedMovementAllowed
        );
        assert_eq!(canonicalize("permissive_yellow"), CanonicalState::Yellow);
        assert_eq!(canonicalize("protected_yellow"), CanonicalState::Yellow);
        assert_eq!(canonicalize("flashing_yellow"), CanonicalState::Yellow);
        assert_eq!(canonicalize("flashing_red"), CanonicalState::StopAndRemain);
        assert_eq!(canonicalize("dark"), CanonicalState::StopAndRemain);
        assert_eq!(canonicalize("unknown"), CanonicalState::StopAndRemain);
    }

    #[test]
    fn lookup_ignores_case_and_separators() {
        assert_eq!(
            canonicalize("PROTECTED_GREEN"),
            CanonicalState::ProtectedMovementAllowed
        );
        assert_eq!(
            canonicalize(" Permissive-Green "),
            CanonicalState::PermissiveMovementAllowed
        );
    }

    #[test]
    fn unknown_tokens_fail_safe() {
        assert_eq!(canonicalize(""), CanonicalState::StopAndRemain);
        assert_eq!(canonicalize("green"), CanonicalState::StopAndRemain);
        assert_eq!(canonicalize("protected green"), CanonicalState::StopAndRemain);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_string(&CanonicalState::ProtectedMovementAllowed).unwrap();
        assert_eq!(json, "\"protectedMovementAllowed\"");
        for (_, state) in STATE_MAP {
            assert_eq!(
                serde_json::to_value(state).unwrap(),
                serde_json::Value::String(state.to_string())
            );
        }
    }

    proptest! {
        #[test]
        fn canonicalize_is_total(raw in ".*") {
            let state = canonicalize(&raw);
            let known = STATE_MAP
                .iter()
                .any(|(name, _)| *name == raw.trim().to_ascii_lowercase().replace('-', "_"));
            if !known {
                prop_assert_eq!(state, CanonicalState::StopAndRemain);
            }
        }
    }
}

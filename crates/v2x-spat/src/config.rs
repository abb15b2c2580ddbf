//! Static per-intersection configuration.
//!
//! The configuration document looks like:
//!
//! ```json
//! {"intersections": [{"id": 2351, "name": "Main & 1st", "phases": [2, 4, 6, 8]}]}
//! ```
//!
//! It is loaded once at startup and shared read-only for the life of the
//! process. Phase lists are stored sorted ascending and de-duplicated; the
//! order in the source document is not preserved.

use crate::error::ConfigError;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// A signal phase number. Configured phases are always positive.
pub type PhaseNumber = u32;

/// Characters that cannot appear in an intersection id. Ids become a segment
/// of the published key path.
pub const RESERVED_ID_CHARS: [char; 6] = ['/', '.', '#', '$', '[', ']'];

/// Configuration for a single intersection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntersectionConfig {
    /// Intersection identifier, normalised to a decimal string.
    pub id: String,

    /// Human-readable display name.
    pub name: Option<String>,

    /// Valid phases, ascending and unique. Never empty.
    phases: Vec<PhaseNumber>,
}

impl IntersectionConfig {
    /// Create a configuration entry, sorting and de-duplicating `phases`.
    pub fn new(
        id: impl Into<String>,
        name: Option<String>,
        phases: impl IntoIterator<Item = PhaseNumber>,
    ) -> Result<Self, ConfigError> {
        let id = id.into();
        if id.is_empty() || id.contains(RESERVED_ID_CHARS) {
            return Err(ConfigError::UnaddressableId(id));
        }
        let mut phases: Vec<PhaseNumber> = phases.into_iter().collect();
        if phases.is_empty() {
            return Err(ConfigError::InvalidPhases {
                id,
                reason: "must not be empty",
            });
        }
        if phases.contains(&0) {
            return Err(ConfigError::InvalidPhases {
                id,
                reason: "must hold positive integers",
            });
        }
        phases.sort_unstable();
        phases.dedup();

        Ok(Self {
            id,
            name: name.filter(|n| !n.is_empty()),
            phases,
        })
    }

    /// Configured phases in ascending order.
    pub fn phases(&self) -> &[PhaseNumber] {
        &self.phases
    }

    /// Whether `phase` is configured for this intersection.
    pub fn has_phase(&self, phase: i64) -> bool {
        PhaseNumber::try_from(phase)
            .map(|p| self.phases.binary_search(&p).is_ok())
            .unwrap_or(false)
    }
}

/// All configured intersections, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntersectionRegistry {
    intersections: BTreeMap<String, IntersectionConfig>,
}

impl IntersectionRegistry {
    /// Build a registry from already-validated entries.
    pub fn from_entries(
        entries: impl IntoIterator<Item = IntersectionConfig>,
    ) -> Result<Self, ConfigError> {
        let mut intersections = BTreeMap::new();
        for entry in entries {
            if intersections.contains_key(&entry.id) {
                return Err(ConfigError::DuplicateId(entry.id));
            }
            intersections.insert(entry.id.clone(), entry);
        }
        Ok(Self { intersections })
    }

    /// Load the registry from a JSON file on disk.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Parse the registry from JSON text.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let doc: Value = serde_json::from_str(raw)?;
        Self::load(&doc)
    }

    /// Parse the registry from a decoded configuration document.
    pub fn load(doc: &Value) -> Result<Self, ConfigError> {
        let items = doc
            .get("intersections")
            .and_then(Value::as_array)
            .ok_or(ConfigError::MissingIntersections)?;

        let mut entries = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            entries.push(parse_entry(index, item)?);
        }
        Self::from_entries(entries)
    }

    /// Look up an intersection by id.
    pub fn get(&self, id: &str) -> Option<&IntersectionConfig> {
        self.intersections.get(id)
    }

    /// Whether `id` is configured.
    pub fn contains(&self, id: &str) -> bool {
        self.intersections.contains_key(id)
    }

    /// Iterate over all intersections in id order.
    pub fn iter(&self) -> impl Iterator<Item = &IntersectionConfig> {
        self.intersections.values()
    }

    /// Number of configured intersections.
    pub fn len(&self) -> usize {
        self.intersections.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.intersections.is_empty()
    }

    /// Phase lists keyed by intersection id.
    pub fn phases_by_id(&self) -> BTreeMap<String, Vec<PhaseNumber>> {
        self.intersections
            .iter()
            .map(|(id, cfg)| (id.clone(), cfg.phases.clone()))
            .collect()
    }

    /// Display names keyed by intersection id. Unnamed intersections are absent.
    pub fn names(&self) -> BTreeMap<String, String> {
        self.intersections
            .iter()
            .filter_map(|(id, cfg)| cfg.name.clone().map(|name| (id.clone(), name)))
            .collect()
    }
}

fn parse_entry(index: usize, item: &Value) -> Result<IntersectionConfig, ConfigError> {
    let obj = item
        .as_object()
        .ok_or(ConfigError::EntryNotObject { index })?;

    let id = match obj.get("id") {
        None | Some(Value::Null) => return Err(ConfigError::MissingField { index, field: "id" }),
        Some(v) => id_to_string(v).ok_or(ConfigError::InvalidId { index })?,
    };

    let phases = match obj.get("phases") {
        None | Some(Value::Null) => {
            return Err(ConfigError::MissingField {
                index,
                field: "phases",
            })
        }
        Some(Value::Array(values)) => values,
        Some(_) => {
            return Err(ConfigError::InvalidPhases {
                id,
                reason: "must be a list of integers",
            })
        }
    };

    let mut parsed = Vec::with_capacity(phases.len());
    for value in phases {
        let Some(n) = value.as_i64() else {
            return Err(ConfigError::InvalidPhases {
                id,
                reason: "must be a list of integers",
            });
        };
        let phase = PhaseNumber::try_from(n)
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| ConfigError::InvalidPhases {
                id: id.clone(),
                reason: "must hold positive integers",
            })?;
        parsed.push(phase);
    }

    let name = match obj.get("name") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    IntersectionConfig::new(id, name, parsed)
}

/// Normalise an id that may arrive as a JSON string or integer.
pub(crate) fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

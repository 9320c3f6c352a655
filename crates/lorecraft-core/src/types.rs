//! # Core Type Definitions
//!
//! Data model shared by the store backends, the ingestion pipeline, and the
//! query surface:
//! - Entity payloads (`EntityInput`, `Entity`, `EntitySummary`, `EntityRef`)
//! - Relationships and traversal direction
//! - Events, consequences, and projected state
//! - Full-text search results
//!
//! Properties are JSON maps (`serde_json::Map`) end to end: frontmatter is
//! decoded into them, the backends persist them as JSON/JSONB, and query
//! responses serialize them unchanged.

use serde::{Deserialize, Serialize};

use crate::error::LoreError;

/// JSON property map attached to an entity.
pub type Properties = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// ENTITIES
// =============================================================================

/// Payload for an entity upsert.
///
/// `name` is the display string; the store derives the lower-cased
/// `name_normalized` identity key from it. `(name_normalized, layer)` is
/// unique across the whole graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityInput {
    pub name: String,
    pub entity_type: String,
    pub layer: String,
    pub source_file: String,
    pub source_hash: String,
    pub properties: Properties,
    pub tags: Vec<String>,
    pub body: String,
}

/// A fully hydrated entity as returned by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub layer: String,
    pub source_file: String,
    pub source_hash: String,
    pub tags: Vec<String>,
    pub properties: Properties,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub body: String,
}

/// Lightweight entity listing row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntitySummary {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub layer: String,
    pub tags: Vec<String>,
}

/// One endpoint of a relationship.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub layer: String,
}

// =============================================================================
// RELATIONSHIPS
// =============================================================================

/// Traversal direction, also used as the per-edge orientation label.
///
/// `Both` is only meaningful as a traversal filter; edges reported from a
/// traversal always carry `Outgoing` or `Incoming` relative to the frontier
/// node that discovered them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

impl Direction {
    /// Parse a user-supplied direction string. Empty input means `Both`.
    pub fn parse(s: &str) -> Result<Self, LoreError> {
        match s.trim() {
            "" | "both" => Ok(Self::Both),
            "outgoing" => Ok(Self::Outgoing),
            "incoming" => Ok(Self::Incoming),
            other => Err(LoreError::InvalidDirection(other.to_string())),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Outgoing => "outgoing",
            Self::Incoming => "incoming",
            Self::Both => "both",
        }
    }
}

/// A directed relationship discovered by a traversal.
///
/// `depth` records the hop at which the edge was found. At depth > 1 the
/// `direction` reflects the first frontier node matched against the edge and
/// is not required to match a global orientation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub from: EntityRef,
    pub to: EntityRef,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub direction: Direction,
    pub depth: u32,
}

// =============================================================================
// SEARCH
// =============================================================================

/// A ranked full-text search hit. Higher score is a better match on both
/// backends; `snippet` highlights matches with `**…**` boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub layer: String,
    pub tags: Vec<String>,
    pub score: f64,
    pub snippet: String,
}

// =============================================================================
// EVENTS & STATE
// =============================================================================

/// A declarative state mutation attached to an event.
///
/// Exactly one of `value` (overwrite) or `add` (append to a list-valued
/// property) is populated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Consequence {
    pub entity: String,
    pub property: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add: Option<serde_json::Value>,
}

/// An event entity hydrated with its graph context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub layer: String,
    pub session: i64,
    pub date_in_world: String,
    pub participants: Vec<String>,
    pub location: Vec<String>,
    pub consequences: Vec<Consequence>,
}

/// The projection of a canonical entity through a derived layer's events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurrentState {
    pub base_properties: Properties,
    pub events: Vec<Event>,
    pub current_properties: Properties,
}

// =============================================================================
// TESTS
// =============================================================================

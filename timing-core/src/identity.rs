//! Identity types for timing-core entities.
//!
//! Entities are identified by opaque, monotonically-assigned `i64`s handed
//! out by the repository on insert. The macro below gives each entity
//! kind its own newtype so ids cannot be mixed up across tables at compile
//! time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trait for type-safe entity ids backed by an opaque `i64`.
pub trait EntityIdType:
    Copy
    + Clone
    + Eq
    + PartialEq
    + Ord
    + std::hash::Hash
    + fmt::Debug
    + fmt::Display
    + FromStr
    + Serialize
    + serde::de::DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// The name of the entity type (e.g., "event", "punch").
    const ENTITY_NAME: &'static str;

    /// Wrap a raw id.
    fn new(raw: i64) -> Self;

    /// Unwrap the raw id.
    fn raw(&self) -> i64;
}

/// Error returned when parsing an entity id from a string fails.
#[derive(Debug, Clone)]
pub struct EntityIdParseError {
    pub entity_name: &'static str,
    pub input: String,
}

impl fmt::Display for EntityIdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Failed to parse {} id from '{}'",
            self.entity_name, self.input
        )
    }
}

impl std::error::Error for EntityIdParseError {}

macro_rules! define_entity_id {
    ($name:ident, $entity:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(i64);

        impl EntityIdType for $name {
            const ENTITY_NAME: &'static str = $entity;

            fn new(raw: i64) -> Self {
                Self(raw)
            }

            fn raw(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = EntityIdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse::<i64>()
                    .map(Self::new)
                    .map_err(|_| EntityIdParseError {
                        entity_name: Self::ENTITY_NAME,
                        input: s.to_string(),
                    })
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                self.0.serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                i64::deserialize(deserializer).map(Self::new)
            }
        }
    };
}

define_entity_id!(EventId, "event", "Id of a race event (one race day).");
define_entity_id!(ControlId, "control", "Id of a physical timing control.");
define_entity_id!(StageId, "stage", "Id of a timed stage.");
define_entity_id!(CourseId, "course", "Id of an ordered collection of stages.");
define_entity_id!(ClassId, "class", "Id of a competitor class.");
define_entity_id!(EntryId, "entry", "Id of a competitor's entry in an event.");
define_entity_id!(ChipMappingId, "chip_mapping", "Id of a chip→bib mapping row.");
define_entity_id!(PunchId, "punch", "Id of a raw chip punch.");
define_entity_id!(StageRunId, "stage_run", "Id of a computed stage attempt.");
define_entity_id!(
    OverallResultId,
    "overall_result",
    "Id of an entry's overall classification row."
);
define_entity_id!(JournalId, "journal_entry", "Monotonic id of a journal entry.");
define_entity_id!(AuditLogId, "audit_log_entry", "Id of an audit log entry.");

/// Timestamp type used throughout the core — always UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_ids_do_not_compare_across_types() {
        let a = EventId::new(1);
        let b = EventId::new(1);
        assert_eq!(a, b);
    }

    #[test]
    fn display_and_parse_round_trip() {
        let id = StageId::new(42);
        let text = id.to_string();
        assert_eq!(text, "42");
        let parsed: StageId = text.parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn parse_error_names_the_entity() {
        let err: Result<ChipMappingId, _> = "not-a-number".parse();
        let err = err.unwrap_err();
        assert_eq!(err.entity_name, "chip_mapping");
    }

    #[test]
    fn serde_round_trip_is_a_bare_integer() {
        let id = PunchId::new(7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "7");
        let back: PunchId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}

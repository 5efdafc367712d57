//! Enum types for timing-core entities.

use serde::{Deserialize, Serialize};

/// Race format. Polymorphism point for overall aggregation:
/// the four formats differ only in how a total is rolled up from
/// counting stage times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceFormat {
    Enduro,
    Downhill,
    Xc,
    DualSlalom,
}

impl RaceFormat {
    /// Parse from the event's stored format string, defaulting to
    /// `Enduro` with a warning flag when unrecognized (see DESIGN.md for
    /// the rationale).
    pub fn from_str_lenient(s: &str) -> (Self, bool) {
        match s {
            "enduro" => (Self::Enduro, false),
            "downhill" => (Self::Downhill, false),
            "xc" => (Self::Xc, false),
            "dual_slalom" => (Self::DualSlalom, false),
            _ => (Self::Enduro, true),
        }
    }
}

/// Whether a course's stages must run in a fixed order or may be taken
/// freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOrder {
    Fixed,
    Free,
}

/// Display precision for elapsed/behind formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePrecision {
    Seconds,
    Tenths,
    Hundredths,
}

/// Event lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Setup,
    Active,
    Finished,
}

/// Control (beacon) type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlType {
    Start,
    Split,
    Finish,
}

/// Competitor/entry lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Registered,
    Dns,
    Dnf,
    Dsq,
}

/// Source of a punch reading. Ordering matters: `priority()` returns a
/// smaller number for a stronger source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PunchSource {
    Usb,
    Sirap,
    Roc,
    Manual,
}

impl PunchSource {
    /// Lower is stronger. USB chip memory is ground truth; manual entry
    /// is the weakest source.
    pub fn priority(self) -> u8 {
        match self {
            Self::Usb => 1,
            Self::Sirap => 2,
            Self::Roc => 3,
            Self::Manual => 4,
        }
    }
}

impl std::fmt::Display for PunchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Usb => "usb",
            Self::Sirap => "sirap",
            Self::Roc => "roc",
            Self::Manual => "manual",
        };
        write!(f, "{s}")
    }
}

/// Status of a computed stage attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Ok,
    Dns,
    Dnf,
    Dsq,
}

/// Lifecycle state of a `StageRun` row, independent of `RunStatus` (spec
/// §3/§9: "state rather than mutation" — superseded rows are kept, not
/// deleted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Valid,
    Superseded,
}

/// Which side of a stage a punch's control code resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageSide {
    Start,
    Finish,
}

/// Semantic kind of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalKind {
    RunCreated,
    RunSuperseded,
    ChipChanged,
    StatusChanged,
    PenaltyAdded,
    ManualPunch,
}

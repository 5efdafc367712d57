//! Observer hook payload types. The core emits these to a
//! registered sink; the sink owns delivery/formatting to operator,
//! speaker, and audience displays. Grounded in
//! `api/websocket.py::ConnectionManager.broadcast_*` and
//! `generate_highlights`.

use crate::*;
use serde::{Deserialize, Serialize};

/// A snapshot of one standings row, as broadcast to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandingsRow {
    pub position: Option<i32>,
    pub bib: i64,
    pub total_seconds: Option<f64>,
    pub time_behind: Option<f64>,
    pub status: RunStatus,
}

/// Category of an auto-generated speaker highlight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightCategory {
    NewLeader,
    CloseFinish,
    Podium,
}

/// Priority hint for a highlight, used by the speaker display to decide
/// urgency of presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightPriority {
    Normal,
    High,
}

/// One event emitted to the observer sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObserverEvent {
    Punch {
        bib: Option<i64>,
        chip_id: i64,
        control_code: i64,
        time: Timestamp,
        source: PunchSource,
        stage_run: Option<StageRun>,
    },
    Standings {
        event_id: EventId,
        class_id: ClassId,
        rows: Vec<StandingsRow>,
    },
    Highlight {
        category: HighlightCategory,
        text: String,
        bib: i64,
        stage_number: Option<i32>,
        priority: HighlightPriority,
    },
    StageStatus {
        stage_id: StageId,
        name: String,
        status: &'static str,
        riders_on_course: i32,
        riders_finished: i32,
        leader_bib: Option<i64>,
    },
}

/// Sink for observer events. `standings_frozen` suppression is the
/// sink's responsibility; the core always computes and always
/// calls this hook.
pub trait ObserverSink: Send + Sync {
    fn notify(&self, event: ObserverEvent);
}

/// An observer sink that drops every event — used where no downstream
/// display is wired up (tests, bulk recompute without live observers).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserverSink;

impl ObserverSink for NullObserverSink {
    fn notify(&self, _event: ObserverEvent) {}
}

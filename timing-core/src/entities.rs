//! Core entity structures. Pure data — behavior lives in
//! `timing-engine`.

use crate::*;
use serde::{Deserialize, Serialize};

/// A single race day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub date: String,
    pub location: Option<String>,
    pub format: RaceFormat,
    pub stage_order: StageOrder,
    pub time_precision: TimePrecision,
    pub status: EventStatus,
    pub dual_slalom_window_seconds: Option<f64>,
    pub upstream_competition_id: Option<String>,
}

impl Event {
    /// `setup -> active` is permitted only once the event has at least one
    /// control, one stage, and one class.
    pub fn can_activate(&self, control_count: usize, stage_count: usize, class_count: usize) -> bool {
        self.status == EventStatus::Setup
            && control_count >= 1
            && stage_count >= 1
            && class_count >= 1
    }
}

/// A physical timing beacon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    pub id: ControlId,
    pub event_id: EventId,
    pub code: i64,
    pub name: String,
    pub control_type: ControlType,
}

/// A timed segment bounded by a start and a finish control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub event_id: EventId,
    pub stage_number: i32,
    pub name: String,
    pub start_control_id: ControlId,
    pub finish_control_id: ControlId,
    pub is_timed: bool,
    pub runs_to_count: i32,
    pub max_runs: Option<i32>,
}

impl Stage {
    /// `runs_to_count` is always >= 1 even if stored as 0/garbage.
    pub fn effective_runs_to_count(&self) -> i32 {
        self.runs_to_count.max(1)
    }

    pub fn side_for_control(&self, control_id: ControlId) -> Option<StageSide> {
        if control_id == self.start_control_id {
            Some(StageSide::Start)
        } else if control_id == self.finish_control_id {
            Some(StageSide::Finish)
        } else {
            None
        }
    }
}

/// An ordered collection of stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub event_id: EventId,
    pub name: String,
    pub laps: i32,
    pub stages_any_order: bool,
    pub allow_repeat: bool,
}

/// Ordered junction between a `Course` and its member `Stage`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseStage {
    pub course_id: CourseId,
    pub stage_id: StageId,
    pub stage_order: i32,
}

/// A competitor category, bound to exactly one course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    pub id: ClassId,
    pub event_id: EventId,
    pub name: String,
    pub course_id: CourseId,
    pub mass_start_time: Option<Timestamp>,
}

/// One competitor per event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub event_id: EventId,
    pub bib: i64,
    pub first_name: String,
    pub last_name: String,
    pub club: Option<String>,
    pub class_id: ClassId,
    pub status: EntryStatus,
}

/// One or more chips per entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipMapping {
    pub id: ChipMappingId,
    pub event_id: EventId,
    pub entry_id: EntryId,
    pub chip_id: i64,
    pub is_primary: bool,
}

/// An immutable raw chip reading. Punches are never mutated after
/// insertion; `is_duplicate` is assigned at insert time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Punch {
    pub id: PunchId,
    pub event_id: EventId,
    pub chip_id: i64,
    pub control_code: i64,
    pub punch_time: Timestamp,
    pub source: PunchSource,
    pub upstream_id: Option<i64>,
    pub is_duplicate: bool,
    pub received_at: Timestamp,
}

/// A computed attempt on a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRun {
    pub id: StageRunId,
    pub event_id: EventId,
    pub entry_id: EntryId,
    pub stage_id: StageId,
    pub attempt: i32,
    pub start_punch_id: Option<PunchId>,
    pub finish_punch_id: Option<PunchId>,
    pub start_time: Option<Timestamp>,
    pub finish_time: Option<Timestamp>,
    pub elapsed_seconds: Option<f64>,
    pub penalty_seconds: f64,
    pub status: RunStatus,
    pub run_state: RunState,
}

impl StageRun {
    /// §3 invariant: `run_state = valid ⇔ status = ok ∧ elapsed_seconds ≥ 0`.
    pub fn invariant_holds(&self) -> bool {
        let ok_and_nonneg = self.status == RunStatus::Ok
            && self.elapsed_seconds.map(|e| e >= 0.0).unwrap_or(false);
        (self.run_state == RunState::Valid) == ok_and_nonneg
    }

    /// Counting time for ranking purposes: elapsed plus any penalty.
    pub fn counting_time(&self) -> Option<f64> {
        self.elapsed_seconds.map(|e| e + self.penalty_seconds)
    }
}

/// One per `(event, entry)`, fully derived from `StageRun`s — never the
/// primary source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallResult {
    pub id: OverallResultId,
    pub event_id: EventId,
    pub entry_id: EntryId,
    pub total_seconds: Option<f64>,
    pub position: Option<i32>,
    pub time_behind: Option<f64>,
    pub status: RunStatus,
}

/// Append-only semantic event, replicated downstream via the sync journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: JournalId,
    pub event_id: EventId,
    pub kind: JournalKind,
    pub payload: serde_json::Value,
    pub synced: bool,
    pub created_at: Timestamp,
}

/// Administrative audit trail entry — distinct from the sync journal,
/// which only records semantic run events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: AuditLogId,
    pub event_id: Option<EventId>,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub details: Option<String>,
    pub before: Option<String>,
    pub after: Option<String>,
    pub source: String,
    pub created_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_run(status: RunStatus, run_state: RunState, elapsed: Option<f64>) -> StageRun {
        StageRun {
            id: StageRunId::new(1),
            event_id: EventId::new(1),
            entry_id: EntryId::new(1),
            stage_id: StageId::new(1),
            attempt: 1,
            start_punch_id: None,
            finish_punch_id: None,
            start_time: Some(Utc::now()),
            finish_time: Some(Utc::now()),
            elapsed_seconds: elapsed,
            penalty_seconds: 0.0,
            status,
            run_state,
        }
    }

    #[test]
    fn valid_run_requires_ok_status_and_nonneg_elapsed() {
        assert!(sample_run(RunStatus::Ok, RunState::Valid, Some(30.0)).invariant_holds());
        assert!(!sample_run(RunStatus::Ok, RunState::Valid, Some(-1.0)).invariant_holds());
        assert!(!sample_run(RunStatus::Pending, RunState::Valid, Some(30.0)).invariant_holds());
    }

    #[test]
    fn pending_run_is_not_valid() {
        assert!(sample_run(RunStatus::Pending, RunState::Pending, None).invariant_holds());
    }

    #[test]
    fn counting_time_adds_penalty() {
        let mut run = sample_run(RunStatus::Ok, RunState::Valid, Some(30.0));
        run.penalty_seconds = 5.0;
        assert_eq!(run.counting_time(), Some(35.0));
    }

    #[test]
    fn event_cannot_activate_without_prerequisites() {
        let event = Event {
            id: EventId::new(1),
            name: "Test".into(),
            date: "2026-07-28".into(),
            location: None,
            format: RaceFormat::Enduro,
            stage_order: StageOrder::Fixed,
            time_precision: TimePrecision::Seconds,
            status: EventStatus::Setup,
            dual_slalom_window_seconds: None,
            upstream_competition_id: None,
        };
        assert!(!event.can_activate(0, 1, 1));
        assert!(event.can_activate(1, 1, 1));
    }
}

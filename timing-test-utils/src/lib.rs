//! Test Utilities
//!
//! Centralized test infrastructure for the timing workspace:
//! - Proptest generators for core entity ids, enums, and structs
//! - Fixture builders for common event shapes (active enduro/downhill
//!   events with controls, stages, courses, classes, and entries wired
//!   up)
//! - Custom assertions for `TimingResult`-returning code

pub use timing_core::*;
pub use timing_storage::{InMemoryRepository, NewEvent, Repository};

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for timing-core types. Ids are generated over
    //! a small positive range so generated fixtures read like plausible
    //! race data rather than scattering across the full `i64` space.

    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn arb_id<T: EntityIdType>() -> impl Strategy<Value = T> {
        (1i64..=10_000).prop_map(T::new)
    }

    pub fn arb_event_id() -> impl Strategy<Value = EventId> {
        arb_id()
    }

    pub fn arb_control_id() -> impl Strategy<Value = ControlId> {
        arb_id()
    }

    pub fn arb_stage_id() -> impl Strategy<Value = StageId> {
        arb_id()
    }

    pub fn arb_course_id() -> impl Strategy<Value = CourseId> {
        arb_id()
    }

    pub fn arb_class_id() -> impl Strategy<Value = ClassId> {
        arb_id()
    }

    pub fn arb_entry_id() -> impl Strategy<Value = EntryId> {
        arb_id()
    }

    pub fn arb_stage_run_id() -> impl Strategy<Value = StageRunId> {
        arb_id()
    }

    /// A UTC timestamp somewhere in race-day hours, second-resolution —
    /// matching the wall-clock granularity punch files are recorded at.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (0i64..86_400).prop_map(|secs_from_midnight| {
            Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs_from_midnight)
        })
    }

    pub fn arb_race_format() -> impl Strategy<Value = RaceFormat> {
        prop_oneof![
            Just(RaceFormat::Enduro),
            Just(RaceFormat::Downhill),
            Just(RaceFormat::Xc),
            Just(RaceFormat::DualSlalom),
        ]
    }

    pub fn arb_stage_order() -> impl Strategy<Value = StageOrder> {
        prop_oneof![Just(StageOrder::Fixed), Just(StageOrder::Free)]
    }

    pub fn arb_time_precision() -> impl Strategy<Value = TimePrecision> {
        prop_oneof![
            Just(TimePrecision::Seconds),
            Just(TimePrecision::Tenths),
            Just(TimePrecision::Hundredths),
        ]
    }

    pub fn arb_event_status() -> impl Strategy<Value = EventStatus> {
        prop_oneof![
            Just(EventStatus::Setup),
            Just(EventStatus::Active),
            Just(EventStatus::Finished),
        ]
    }

    pub fn arb_control_type() -> impl Strategy<Value = ControlType> {
        prop_oneof![Just(ControlType::Start), Just(ControlType::Split), Just(ControlType::Finish)]
    }

    pub fn arb_entry_status() -> impl Strategy<Value = EntryStatus> {
        prop_oneof![
            Just(EntryStatus::Registered),
            Just(EntryStatus::Dns),
            Just(EntryStatus::Dnf),
            Just(EntryStatus::Dsq),
        ]
    }

    pub fn arb_punch_source() -> impl Strategy<Value = PunchSource> {
        prop_oneof![
            Just(PunchSource::Usb),
            Just(PunchSource::Sirap),
            Just(PunchSource::Roc),
            Just(PunchSource::Manual),
        ]
    }

    pub fn arb_run_status() -> impl Strategy<Value = RunStatus> {
        prop_oneof![
            Just(RunStatus::Pending),
            Just(RunStatus::Ok),
            Just(RunStatus::Dns),
            Just(RunStatus::Dnf),
            Just(RunStatus::Dsq),
        ]
    }

    pub fn arb_run_state() -> impl Strategy<Value = RunState> {
        prop_oneof![Just(RunState::Pending), Just(RunState::Valid), Just(RunState::Superseded)]
    }

    pub fn arb_journal_kind() -> impl Strategy<Value = JournalKind> {
        prop_oneof![
            Just(JournalKind::RunCreated),
            Just(JournalKind::RunSuperseded),
            Just(JournalKind::ChipChanged),
            Just(JournalKind::StatusChanged),
            Just(JournalKind::PenaltyAdded),
            Just(JournalKind::ManualPunch),
        ]
    }

    /// A punch with a plausible bib-sized chip id and control code.
    pub fn arb_punch() -> impl Strategy<Value = Punch> {
        (
            arb_id::<PunchId>(),
            arb_event_id(),
            1i64..=999,
            1i64..=500,
            arb_timestamp(),
            arb_punch_source(),
            proptest::option::of(1i64..=100_000),
            arb_timestamp(),
        )
            .prop_map(
                |(id, event_id, chip_id, control_code, punch_time, source, upstream_id, received_at)| Punch {
                    id,
                    event_id,
                    chip_id,
                    control_code,
                    punch_time,
                    source,
                    upstream_id,
                    is_duplicate: false,
                    received_at,
                },
            )
    }

    /// A `StageRun` satisfying the `run_state ⇔ status=ok ∧ elapsed≥0`
    /// invariant, by construction rather than by filtering.
    pub fn arb_valid_stage_run() -> impl Strategy<Value = StageRun> {
        (
            arb_stage_run_id(),
            arb_event_id(),
            arb_entry_id(),
            arb_stage_id(),
            1i32..=5,
            0.0f64..3600.0,
            0.0f64..30.0,
        )
            .prop_map(|(id, event_id, entry_id, stage_id, attempt, elapsed, penalty)| {
                let start = Utc.with_ymd_and_hms(2026, 7, 28, 10, 0, 0).unwrap();
                StageRun {
                    id,
                    event_id,
                    entry_id,
                    stage_id,
                    attempt,
                    start_punch_id: None,
                    finish_punch_id: None,
                    start_time: Some(start),
                    finish_time: Some(start + chrono::Duration::milliseconds((elapsed * 1000.0) as i64)),
                    elapsed_seconds: Some(elapsed),
                    penalty_seconds: penalty,
                    status: RunStatus::Ok,
                    run_state: RunState::Valid,
                }
            })
    }

    /// A `TimingConfig` with strictly positive tunables, matching every
    /// combination the engine is expected to accept.
    pub fn arb_valid_config() -> impl Strategy<Value = TimingConfig> {
        (0.1f64..10.0, 0.1f64..10.0, 0.1f64..30.0).prop_map(
            |(dedup_window_seconds, close_finish_threshold_seconds, default_dual_slalom_window_seconds)| TimingConfig {
                dedup_window_seconds,
                close_finish_threshold_seconds,
                default_dual_slalom_window_seconds,
            },
        )
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Builders for common event shapes, backed by an `InMemoryRepository`.

    use super::*;

    /// A fully wired single-stage event: one start/finish control pair,
    /// one stage, one course, one class — in `Active` status, ready to
    /// accept punches. Returns the ids a test usually needs next.
    pub struct SingleStageEvent {
        pub event_id: EventId,
        pub start_control_id: ControlId,
        pub finish_control_id: ControlId,
        pub stage_id: StageId,
        pub course_id: CourseId,
        pub class_id: ClassId,
    }

    pub fn single_stage_event(repo: &InMemoryRepository, format: RaceFormat, runs_to_count: i32, max_runs: Option<i32>) -> SingleStageEvent {
        let event = repo.create_event(NewEvent {
            name: "Fixture Event".into(),
            date: "2026-07-28".into(),
            location: None,
            format,
            stage_order: StageOrder::Fixed,
            time_precision: TimePrecision::Seconds,
            dual_slalom_window_seconds: None,
            upstream_competition_id: None,
        });

        repo.with_event(event.id, |data| {
            let start = data.insert_control(100, "Start".into(), ControlType::Start);
            let finish = data.insert_control(200, "Finish".into(), ControlType::Finish);
            let stage = data.insert_stage(1, "Stage 1".into(), start.id, finish.id, true, runs_to_count, max_runs);
            let course = data.insert_course("Course".into(), 1, false, false);
            data.link_course_stage(course.id, stage.id, 1);
            let class = data.insert_class("Open".into(), course.id, None);
            data.set_event_status(EventStatus::Active);
            Ok(SingleStageEvent {
                event_id: event.id,
                start_control_id: start.id,
                finish_control_id: finish.id,
                stage_id: stage.id,
                course_id: course.id,
                class_id: class.id,
            })
        })
        .expect("fixture setup never fails")
    }

    /// Register `count` entries with bibs `1..=count` into `class_id`,
    /// returning their assigned `EntryId`s in bib order.
    pub fn register_entries(repo: &InMemoryRepository, event_id: EventId, class_id: ClassId, count: i64) -> Vec<EntryId> {
        repo.with_event(event_id, |data| {
            Ok((1..=count)
                .map(|bib| data.insert_entry(bib, format!("First{bib}"), format!("Last{bib}"), None, class_id).id)
                .collect())
        })
        .expect("fixture setup never fails")
    }

    /// A one-rider, one-stage downhill-shaped event with a bounded
    /// `max_runs`, with the rider's entry already registered. Returns
    /// the event and the rider's entry id.
    pub fn downhill_single_rider(repo: &InMemoryRepository, max_runs: Option<i32>) -> (SingleStageEvent, EntryId) {
        let event = single_stage_event(repo, RaceFormat::Downhill, 1, max_runs);
        let entries = register_entries(repo, event.event_id, event.class_id, 1);
        (event, entries[0])
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertions for `TimingResult`-returning code and for the
    //! `StageRun`/`OverallResult` invariants.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &TimingResult<T>) {
        assert!(result.is_ok(), "expected Ok, got Err: {:?}", result);
    }

    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &TimingResult<T>) {
        assert!(result.is_err(), "expected Err, got Ok: {:?}", result);
    }

    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &TimingResult<T>) {
        match result {
            Err(TimingError::Storage(_)) => {}
            other => panic!("expected Storage error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_admission_error<T: std::fmt::Debug>(result: &TimingResult<T>) {
        match result {
            Err(TimingError::Admission(_)) => {}
            other => panic!("expected Admission error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &TimingResult<T>, entity: &str) {
        match result {
            Err(TimingError::Storage(StorageError::NotFound { entity: e, .. })) => {
                assert_eq!(*e, entity, "wrong entity in NotFound error");
            }
            other => panic!("expected NotFound({entity}) error, got: {:?}", other),
        }
    }

    /// Assert the §3 invariant: `run_state=valid ⇔ status=ok ∧
    /// elapsed_seconds ≥ 0`.
    #[track_caller]
    pub fn assert_run_invariant_holds(run: &StageRun) {
        assert!(run.invariant_holds(), "invariant violated for stage_run {:?}", run);
    }

    /// Assert that `elapsed` matches `finish_time − start_time` within
    /// a 0.01 s tolerance.
    #[track_caller]
    pub fn assert_elapsed_matches_punches(run: &StageRun) {
        let (Some(start), Some(finish), Some(elapsed)) = (run.start_time, run.finish_time, run.elapsed_seconds) else {
            panic!("run {:?} is missing start/finish/elapsed", run);
        };
        let expected = (finish - start).num_milliseconds() as f64 / 1000.0;
        assert!(
            (elapsed - expected).abs() < 0.01,
            "elapsed {elapsed} does not match finish-start {expected} for run {:?}",
            run
        );
    }
}

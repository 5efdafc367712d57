//! Per-event table storage. `EventData` holds every
//! row scoped to one event and assigns ids on insert. All access to an
//! `EventData` happens inside `Repository::with_event`'s critical
//! section — see `repository.rs`.

use chrono::Utc;
use timing_core::*;

#[derive(Debug, Default)]
struct IdCounters {
    control: i64,
    stage: i64,
    class: i64,
    course: i64,
    entry: i64,
    chip_mapping: i64,
    punch: i64,
    stage_run: i64,
    overall_result: i64,
    journal: i64,
}

/// All rows belonging to a single event, plus the next-id counters used
/// to hand out ids on insert.
#[derive(Debug)]
pub struct EventData {
    event: Event,
    controls: Vec<Control>,
    stages: Vec<Stage>,
    courses: Vec<Course>,
    course_stages: Vec<CourseStage>,
    classes: Vec<Class>,
    entries: Vec<Entry>,
    chip_mappings: Vec<ChipMapping>,
    punches: Vec<Punch>,
    stage_runs: Vec<StageRun>,
    overall_results: Vec<OverallResult>,
    journal: Vec<JournalEntry>,
    ids: IdCounters,
}

impl EventData {
    pub(crate) fn new(event: Event) -> Self {
        Self {
            event,
            controls: Vec::new(),
            stages: Vec::new(),
            courses: Vec::new(),
            course_stages: Vec::new(),
            classes: Vec::new(),
            entries: Vec::new(),
            chip_mappings: Vec::new(),
            punches: Vec::new(),
            stage_runs: Vec::new(),
            overall_results: Vec::new(),
            journal: Vec::new(),
            ids: IdCounters::default(),
        }
    }

    // -- event ----------------------------------------------------------

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn set_event_status(&mut self, status: EventStatus) {
        self.event.status = status;
    }

    /// Update the event-level fields a template carries. Entries,
    /// punches, and runs are untouched.
    pub fn set_structure_fields(
        &mut self,
        format: RaceFormat,
        stage_order: StageOrder,
        time_precision: TimePrecision,
        dual_slalom_window_seconds: Option<f64>,
    ) {
        self.event.format = format;
        self.event.stage_order = stage_order;
        self.event.time_precision = time_precision;
        self.event.dual_slalom_window_seconds = dual_slalom_window_seconds;
    }

    /// Clear controls, stages, courses, and classes ahead of a template
    /// import — not entries, punches, or runs. A template apply always
    /// clears the event's structural entities before reimporting.
    pub fn clear_structural_entities(&mut self) {
        self.controls.clear();
        self.stages.clear();
        self.courses.clear();
        self.course_stages.clear();
        self.classes.clear();
    }

    // -- control ----------------------------------------------------------

    pub fn insert_control(&mut self, code: i64, name: String, control_type: ControlType) -> Control {
        self.ids.control += 1;
        let control = Control {
            id: ControlId::new(self.ids.control),
            event_id: self.event.id,
            code,
            name,
            control_type,
        };
        self.controls.push(control.clone());
        control
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn control(&self, id: ControlId) -> Option<&Control> {
        self.controls.iter().find(|c| c.id == id)
    }

    pub fn control_by_code(&self, code: i64) -> Option<&Control> {
        self.controls.iter().find(|c| c.code == code)
    }

    // -- stage ----------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn insert_stage(
        &mut self,
        stage_number: i32,
        name: String,
        start_control_id: ControlId,
        finish_control_id: ControlId,
        is_timed: bool,
        runs_to_count: i32,
        max_runs: Option<i32>,
    ) -> Stage {
        self.ids.stage += 1;
        let stage = Stage {
            id: StageId::new(self.ids.stage),
            event_id: self.event.id,
            stage_number,
            name,
            start_control_id,
            finish_control_id,
            is_timed,
            runs_to_count,
            max_runs,
        };
        self.stages.push(stage.clone());
        stage
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, id: StageId) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == id)
    }

    /// Every stage for which `control_id` is either the start or finish
    /// control — a punch resolves against every stage that references
    /// its control.
    pub fn stages_using_control(&self, control_id: ControlId) -> Vec<&Stage> {
        self.stages
            .iter()
            .filter(|s| s.side_for_control(control_id).is_some())
            .collect()
    }

    // -- course / course_stage --------------------------------------------

    pub fn insert_course(&mut self, name: String, laps: i32, stages_any_order: bool, allow_repeat: bool) -> Course {
        self.ids.course += 1;
        let course = Course {
            id: CourseId::new(self.ids.course),
            event_id: self.event.id,
            name,
            laps,
            stages_any_order,
            allow_repeat,
        };
        self.courses.push(course.clone());
        course
    }

    pub fn courses(&self) -> &[Course] {
        &self.courses
    }

    pub fn course(&self, id: CourseId) -> Option<&Course> {
        self.courses.iter().find(|c| c.id == id)
    }

    /// The event's first course, or a freshly materialized default
    /// "Huvudbana" course linked to every existing stage if none exists
    /// yet.
    pub fn ensure_default_course(&mut self) -> CourseId {
        if let Some(existing) = self.courses.first() {
            return existing.id;
        }
        let course = self.insert_course("Huvudbana".to_string(), 1, false, false);
        let stage_ids: Vec<StageId> = self.stages.iter().map(|s| s.id).collect();
        for (i, stage_id) in stage_ids.into_iter().enumerate() {
            self.link_course_stage(course.id, stage_id, i as i32 + 1);
        }
        course.id
    }

    pub fn link_course_stage(&mut self, course_id: CourseId, stage_id: StageId, stage_order: i32) -> CourseStage {
        let link = CourseStage {
            course_id,
            stage_id,
            stage_order,
        };
        self.course_stages.push(link);
        link
    }

    /// Stage ids for a course, in ascending `stage_order`.
    pub fn course_stage_order(&self, course_id: CourseId) -> Vec<StageId> {
        let mut links: Vec<&CourseStage> = self
            .course_stages
            .iter()
            .filter(|cs| cs.course_id == course_id)
            .collect();
        links.sort_by_key(|cs| cs.stage_order);
        links.into_iter().map(|cs| cs.stage_id).collect()
    }

    // -- class ----------------------------------------------------------

    pub fn insert_class(&mut self, name: String, course_id: CourseId, mass_start_time: Option<Timestamp>) -> Class {
        self.ids.class += 1;
        let class = Class {
            id: ClassId::new(self.ids.class),
            event_id: self.event.id,
            name,
            course_id,
            mass_start_time,
        };
        self.classes.push(class.clone());
        class
    }

    pub fn classes(&self) -> &[Class] {
        &self.classes
    }

    pub fn class(&self, id: ClassId) -> Option<&Class> {
        self.classes.iter().find(|c| c.id == id)
    }

    // -- entry ------------------------------------------------------------

    pub fn insert_entry(
        &mut self,
        bib: i64,
        first_name: String,
        last_name: String,
        club: Option<String>,
        class_id: ClassId,
    ) -> Entry {
        self.ids.entry += 1;
        let entry = Entry {
            id: EntryId::new(self.ids.entry),
            event_id: self.event.id,
            bib,
            first_name,
            last_name,
            club,
            class_id,
            status: EntryStatus::Registered,
        };
        self.entries.push(entry.clone());
        entry
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn entry_by_bib(&self, bib: i64) -> Option<&Entry> {
        self.entries.iter().find(|e| e.bib == bib)
    }

    pub fn entries_in_class(&self, class_id: ClassId) -> Vec<&Entry> {
        self.entries.iter().filter(|e| e.class_id == class_id).collect()
    }

    /// Upsert an entry's mutable fields by bib during startlist import.
    pub fn update_entry_fields(
        &mut self,
        entry_id: EntryId,
        first_name: String,
        last_name: String,
        club: Option<String>,
        class_id: ClassId,
    ) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == entry_id) {
            entry.first_name = first_name;
            entry.last_name = last_name;
            entry.club = club;
            entry.class_id = class_id;
        }
    }

    pub fn set_entry_status(&mut self, entry_id: EntryId, status: EntryStatus) -> TimingResult<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or(StorageError::NotFound {
                entity: "entry",
                id: entry_id.raw(),
            })?;
        entry.status = status;
        Ok(())
    }

    // -- chip mapping -------------------------------------------------------

    pub fn upsert_chip_mapping(&mut self, entry_id: EntryId, chip_id: i64, is_primary: bool) -> ChipMapping {
        if let Some(existing) = self
            .chip_mappings
            .iter_mut()
            .find(|m| m.entry_id == entry_id && m.chip_id == chip_id)
        {
            existing.is_primary = is_primary;
            return *existing;
        }
        self.ids.chip_mapping += 1;
        let mapping = ChipMapping {
            id: ChipMappingId::new(self.ids.chip_mapping),
            event_id: self.event.id,
            entry_id,
            chip_id,
            is_primary,
        };
        self.chip_mappings.push(mapping);
        mapping
    }

    pub fn chip_mappings_for_chip(&self, chip_id: i64) -> Vec<&ChipMapping> {
        self.chip_mappings.iter().filter(|m| m.chip_id == chip_id).collect()
    }

    pub fn chip_mappings_for_entry(&self, entry_id: EntryId) -> Vec<&ChipMapping> {
        self.chip_mappings.iter().filter(|m| m.entry_id == entry_id).collect()
    }

    /// The entry a chip currently resolves to: the primary mapping if one
    /// exists, else the most recently added mapping.
    pub fn resolve_chip(&self, chip_id: i64) -> Option<&Entry> {
        let mappings = self.chip_mappings_for_chip(chip_id);
        let mapping = mappings
            .iter()
            .find(|m| m.is_primary)
            .or_else(|| mappings.last())?;
        self.entry(mapping.entry_id)
    }

    // -- punch ------------------------------------------------------------

    pub fn insert_punch(
        &mut self,
        chip_id: i64,
        control_code: i64,
        punch_time: Timestamp,
        source: PunchSource,
        upstream_id: Option<i64>,
        is_duplicate: bool,
    ) -> Punch {
        self.ids.punch += 1;
        let punch = Punch {
            id: PunchId::new(self.ids.punch),
            event_id: self.event.id,
            chip_id,
            control_code,
            punch_time,
            source,
            upstream_id,
            is_duplicate,
            received_at: Utc::now(),
        };
        self.punches.push(punch.clone());
        punch
    }

    pub fn punches(&self) -> &[Punch] {
        &self.punches
    }

    pub fn punch(&self, id: PunchId) -> Option<&Punch> {
        self.punches.iter().find(|p| p.id == id)
    }

    /// Candidate punches for dedup against a new reading: same chip,
    /// same control, within `window_seconds` of `punch_time` (spec
    /// §4.1's closed interval — see `timing-core::clock`'s boundary
    /// test).
    pub fn punches_within_window(
        &self,
        chip_id: i64,
        control_code: i64,
        punch_time: Timestamp,
        window_seconds: f64,
    ) -> Vec<&Punch> {
        self.punches
            .iter()
            .filter(|p| {
                p.chip_id == chip_id
                    && p.control_code == control_code
                    && !p.is_duplicate
                    && (p.punch_time - punch_time).num_milliseconds().unsigned_abs() as f64 / 1000.0
                        <= window_seconds
            })
            .collect()
    }

    /// All punches in receipt order, used by bulk recompute to replay
    /// the event from scratch.
    pub fn punches_in_replay_order(&self) -> Vec<&Punch> {
        let mut punches: Vec<&Punch> = self.punches.iter().collect();
        punches.sort_by_key(|p| (p.punch_time, p.id.raw()));
        punches
    }

    // -- stage run ----------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn insert_stage_run(
        &mut self,
        entry_id: EntryId,
        stage_id: StageId,
        attempt: i32,
        start_punch_id: Option<PunchId>,
        finish_punch_id: Option<PunchId>,
        start_time: Option<Timestamp>,
        finish_time: Option<Timestamp>,
        elapsed_seconds: Option<f64>,
        status: RunStatus,
        run_state: RunState,
    ) -> StageRun {
        self.ids.stage_run += 1;
        let run = StageRun {
            id: StageRunId::new(self.ids.stage_run),
            event_id: self.event.id,
            entry_id,
            stage_id,
            attempt,
            start_punch_id,
            finish_punch_id,
            start_time,
            finish_time,
            elapsed_seconds,
            penalty_seconds: 0.0,
            status,
            run_state,
        };
        self.stage_runs.push(run.clone());
        run
    }

    pub fn update_stage_run(&mut self, updated: StageRun) -> TimingResult<()> {
        let run = self
            .stage_runs
            .iter_mut()
            .find(|r| r.id == updated.id)
            .ok_or(StorageError::NotFound {
                entity: "stage_run",
                id: updated.id.raw(),
            })?;
        *run = updated;
        Ok(())
    }

    pub fn stage_run(&self, id: StageRunId) -> Option<&StageRun> {
        self.stage_runs.iter().find(|r| r.id == id)
    }

    pub fn stage_runs_for(&self, entry_id: EntryId, stage_id: StageId) -> Vec<&StageRun> {
        self.stage_runs
            .iter()
            .filter(|r| r.entry_id == entry_id && r.stage_id == stage_id)
            .collect()
    }

    /// Non-superseded runs for `(entry, stage)`, highest attempt last.
    pub fn active_runs_for(&self, entry_id: EntryId, stage_id: StageId) -> Vec<&StageRun> {
        let mut runs: Vec<&StageRun> = self
            .stage_runs_for(entry_id, stage_id)
            .into_iter()
            .filter(|r| r.run_state != RunState::Superseded)
            .collect();
        runs.sort_by_key(|r| r.attempt);
        runs
    }

    pub fn next_attempt_number(&self, entry_id: EntryId, stage_id: StageId) -> i32 {
        self.stage_runs_for(entry_id, stage_id)
            .iter()
            .map(|r| r.attempt)
            .max()
            .unwrap_or(0)
            + 1
    }

    pub fn valid_runs_for_entry(&self, entry_id: EntryId) -> Vec<&StageRun> {
        self.stage_runs
            .iter()
            .filter(|r| r.entry_id == entry_id && r.run_state == RunState::Valid)
            .collect()
    }

    pub fn all_stage_runs(&self) -> &[StageRun] {
        &self.stage_runs
    }

    pub fn clear_stage_runs(&mut self) {
        self.stage_runs.clear();
    }

    // -- overall result -------------------------------------------------------

    pub fn upsert_overall_result(
        &mut self,
        entry_id: EntryId,
        total_seconds: Option<f64>,
        position: Option<i32>,
        time_behind: Option<f64>,
        status: RunStatus,
    ) -> OverallResult {
        if let Some(existing) = self.overall_results.iter_mut().find(|r| r.entry_id == entry_id) {
            existing.total_seconds = total_seconds;
            existing.position = position;
            existing.time_behind = time_behind;
            existing.status = status;
            return existing.clone();
        }
        self.ids.overall_result += 1;
        let result = OverallResult {
            id: OverallResultId::new(self.ids.overall_result),
            event_id: self.event.id,
            entry_id,
            total_seconds,
            position,
            time_behind,
            status,
        };
        self.overall_results.push(result.clone());
        result
    }

    pub fn overall_result_for_entry(&self, entry_id: EntryId) -> Option<&OverallResult> {
        self.overall_results.iter().find(|r| r.entry_id == entry_id)
    }

    pub fn overall_results_for_class(&self, class_id: ClassId) -> Vec<&OverallResult> {
        let entry_ids: Vec<EntryId> = self.entries_in_class(class_id).iter().map(|e| e.id).collect();
        self.overall_results
            .iter()
            .filter(|r| entry_ids.contains(&r.entry_id))
            .collect()
    }

    pub fn clear_overall_results(&mut self) {
        self.overall_results.clear();
    }

    // -- journal ----------------------------------------------------------

    pub fn append_journal(&mut self, kind: JournalKind, payload: serde_json::Value) -> JournalEntry {
        self.ids.journal += 1;
        let entry = JournalEntry {
            id: JournalId::new(self.ids.journal),
            event_id: self.event.id,
            kind,
            payload,
            synced: false,
            created_at: Utc::now(),
        };
        self.journal.push(entry.clone());
        entry
    }

    pub fn unsynced_journal(&self) -> Vec<&JournalEntry> {
        self.journal.iter().filter(|j| !j.synced).collect()
    }

    pub fn mark_journal_synced(&mut self, ids: &[JournalId]) {
        for entry in self.journal.iter_mut() {
            if ids.contains(&entry.id) {
                entry.synced = true;
            }
        }
    }

    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event {
            id: EventId::new(1),
            name: "Test Enduro".into(),
            date: "2026-07-28".into(),
            location: None,
            format: RaceFormat::Enduro,
            stage_order: StageOrder::Fixed,
            time_precision: TimePrecision::Seconds,
            status: EventStatus::Setup,
            dual_slalom_window_seconds: None,
            upstream_competition_id: None,
        }
    }

    #[test]
    fn insert_control_assigns_sequential_ids() {
        let mut data = EventData::new(sample_event());
        let a = data.insert_control(100, "Start 1".into(), ControlType::Start);
        let b = data.insert_control(101, "Finish 1".into(), ControlType::Finish);
        assert_eq!(a.id.raw(), 1);
        assert_eq!(b.id.raw(), 2);
    }

    #[test]
    fn resolve_chip_prefers_primary_mapping() {
        let mut data = EventData::new(sample_event());
        let class = data.insert_class("Pro Men".into(), CourseId::new(1), None);
        let e1 = data.insert_entry(10, "A".into(), "Rider".into(), None, class.id);
        let e2 = data.insert_entry(11, "B".into(), "Rider".into(), None, class.id);
        data.upsert_chip_mapping(e1.id, 555, false);
        data.upsert_chip_mapping(e2.id, 555, true);
        let resolved = data.resolve_chip(555).unwrap();
        assert_eq!(resolved.id, e2.id);
    }

    #[test]
    fn next_attempt_number_increments_past_superseded() {
        let mut data = EventData::new(sample_event());
        let class = data.insert_class("Pro Men".into(), CourseId::new(1), None);
        let entry = data.insert_entry(10, "A".into(), "Rider".into(), None, class.id);
        let stage = data.insert_stage(1, "SS1".into(), ControlId::new(1), ControlId::new(2), true, 1, None);
        assert_eq!(data.next_attempt_number(entry.id, stage.id), 1);
        data.insert_stage_run(
            entry.id,
            stage.id,
            1,
            None,
            None,
            None,
            None,
            Some(30.0),
            RunStatus::Ok,
            RunState::Valid,
        );
        assert_eq!(data.next_attempt_number(entry.id, stage.id), 2);
    }

    #[test]
    fn active_runs_excludes_superseded() {
        let mut data = EventData::new(sample_event());
        let class = data.insert_class("Pro Men".into(), CourseId::new(1), None);
        let entry = data.insert_entry(10, "A".into(), "Rider".into(), None, class.id);
        let stage = data.insert_stage(1, "SS1".into(), ControlId::new(1), ControlId::new(2), true, 1, None);
        let first = data.insert_stage_run(
            entry.id,
            stage.id,
            1,
            None,
            None,
            None,
            None,
            Some(30.0),
            RunStatus::Ok,
            RunState::Valid,
        );
        let mut superseded = first.clone();
        superseded.run_state = RunState::Superseded;
        data.update_stage_run(superseded).unwrap();
        data.insert_stage_run(
            entry.id,
            stage.id,
            2,
            None,
            None,
            None,
            None,
            Some(28.0),
            RunStatus::Ok,
            RunState::Valid,
        );
        let active = data.active_runs_for(entry.id, stage.id);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].attempt, 2);
    }

    #[test]
    fn punches_within_window_excludes_far_punches() {
        let mut data = EventData::new(sample_event());
        let t0 = Utc::now();
        data.insert_punch(555, 100, t0, PunchSource::Usb, None, false);
        let near = data.punches_within_window(555, 100, t0 + chrono::Duration::seconds(2), 2.0);
        let far = data.punches_within_window(555, 100, t0 + chrono::Duration::seconds(3), 2.0);
        assert_eq!(near.len(), 1);
        assert_eq!(far.len(), 0);
    }
}

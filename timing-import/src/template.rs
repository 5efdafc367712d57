//! Structural template apply, grounded in
//! `core/templates.py`'s built-in template shapes and
//! `api/routes.py::apply_template`'s clear-then-import contract.
//!
//! Applying a template clears the event's structural entities
//! (controls, stages, courses, classes — not entries, punches, or
//! runs), then imports the new ones, collecting a warning for every
//! dangling reference instead of failing the whole import.

use crate::ImportReport;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use timing_core::*;
use timing_storage::{EventData, Repository};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateControl {
    pub code: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub control_type: ControlType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateStage {
    pub stage_number: i32,
    pub name: String,
    pub start_control_code: i64,
    pub finish_control_code: i64,
    pub is_timed: bool,
    pub runs_to_count: i32,
    #[serde(default)]
    pub max_runs: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateCourse {
    pub name: String,
    pub laps: i32,
    pub stages_any_order: bool,
    pub allow_repeat: bool,
    pub stage_numbers: Vec<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateClass {
    pub name: String,
    pub course_name: String,
    #[serde(default)]
    pub mass_start_time: Option<Timestamp>,
}

/// The JSON-shaped document an event template is imported from, and
/// exported back to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventTemplate {
    pub format: RaceFormat,
    pub stage_order: StageOrder,
    pub time_precision: TimePrecision,
    #[serde(default)]
    pub dual_slalom_window: Option<f64>,
    pub controls: Vec<TemplateControl>,
    pub stages: Vec<TemplateStage>,
    pub courses: Vec<TemplateCourse>,
    pub classes: Vec<TemplateClass>,
}

/// Apply `template` to `event_id`: clear existing structural entities,
/// then import controls, stages, courses, and classes in that
/// dependency order, collecting a warning for every reference a later
/// section makes to a code/number/name the template never defined.
pub fn apply_template(repo: &impl Repository, event_id: EventId, template: &EventTemplate) -> TimingResult<ImportReport> {
    repo.with_event(event_id, |data| Ok(apply_template_locked(data, template)))
}

fn apply_template_locked(data: &mut EventData, template: &EventTemplate) -> ImportReport {
    let mut warnings = Vec::new();
    let mut imported = 0;

    data.clear_structural_entities();
    data.set_structure_fields(template.format, template.stage_order, template.time_precision, template.dual_slalom_window);

    let mut control_by_code: HashMap<i64, ControlId> = HashMap::new();
    for c in &template.controls {
        let control = data.insert_control(c.code, c.name.clone(), c.control_type);
        control_by_code.insert(c.code, control.id);
        imported += 1;
    }

    let mut stage_by_number: HashMap<i32, StageId> = HashMap::new();
    for s in &template.stages {
        let Some(&start_id) = control_by_code.get(&s.start_control_code) else {
            warnings.push(format!(
                "stage {} ('{}'): unknown start control code {}",
                s.stage_number, s.name, s.start_control_code
            ));
            continue;
        };
        let Some(&finish_id) = control_by_code.get(&s.finish_control_code) else {
            warnings.push(format!(
                "stage {} ('{}'): unknown finish control code {}",
                s.stage_number, s.name, s.finish_control_code
            ));
            continue;
        };
        let stage = data.insert_stage(s.stage_number, s.name.clone(), start_id, finish_id, s.is_timed, s.runs_to_count, s.max_runs);
        stage_by_number.insert(s.stage_number, stage.id);
        imported += 1;
    }

    let mut course_by_name: HashMap<String, CourseId> = HashMap::new();
    for c in &template.courses {
        let course = data.insert_course(c.name.clone(), c.laps, c.stages_any_order, c.allow_repeat);
        course_by_name.insert(c.name.clone(), course.id);
        imported += 1;
        for (order, stage_number) in c.stage_numbers.iter().enumerate() {
            match stage_by_number.get(stage_number) {
                Some(&stage_id) => {
                    data.link_course_stage(course.id, stage_id, order as i32 + 1);
                }
                None => warnings.push(format!("course '{}': unknown stage number {stage_number}", c.name)),
            }
        }
    }

    for c in &template.classes {
        match course_by_name.get(&c.course_name) {
            Some(&course_id) => {
                data.insert_class(c.name.clone(), course_id, c.mass_start_time);
                imported += 1;
            }
            None => warnings.push(format!("class '{}': unknown course '{}'", c.name, c.course_name)),
        }
    }

    ImportReport { imported, warnings }
}

/// Export `event_id`'s current structural entities (controls, stages,
/// courses, classes) as an `EventTemplate` — the inverse of
/// `apply_template`. Round-tripping `export_template` into
/// `apply_template` on an empty event reproduces the source structure
/// up to control-code / stage-number equivalence (ids are assigned
/// fresh on import, so this compares codes and numbers, not ids).
pub fn export_template(repo: &impl Repository, event_id: EventId) -> TimingResult<EventTemplate> {
    repo.with_event(event_id, |data| Ok(export_template_locked(data)))
}

fn export_template_locked(data: &EventData) -> EventTemplate {
    let controls = data
        .controls()
        .iter()
        .map(|c| TemplateControl {
            code: c.code,
            name: c.name.clone(),
            control_type: c.control_type,
        })
        .collect();

    let stages: Vec<TemplateStage> = data
        .stages()
        .iter()
        .map(|s| TemplateStage {
            stage_number: s.stage_number,
            name: s.name.clone(),
            start_control_code: data.controls().iter().find(|c| c.id == s.start_control_id).map(|c| c.code).unwrap_or_default(),
            finish_control_code: data.controls().iter().find(|c| c.id == s.finish_control_id).map(|c| c.code).unwrap_or_default(),
            is_timed: s.is_timed,
            runs_to_count: s.runs_to_count,
            max_runs: s.max_runs,
        })
        .collect();
    let stage_number_by_id: HashMap<StageId, i32> = data.stages().iter().map(|s| (s.id, s.stage_number)).collect();

    let courses = data
        .courses()
        .iter()
        .map(|c| TemplateCourse {
            name: c.name.clone(),
            laps: c.laps,
            stages_any_order: c.stages_any_order,
            allow_repeat: c.allow_repeat,
            stage_numbers: data
                .course_stage_order(c.id)
                .into_iter()
                .filter_map(|stage_id| stage_number_by_id.get(&stage_id).copied())
                .collect(),
        })
        .collect();
    let course_name_by_id: HashMap<CourseId, String> = data.courses().iter().map(|c| (c.id, c.name.clone())).collect();

    let classes = data
        .classes()
        .iter()
        .map(|c| TemplateClass {
            name: c.name.clone(),
            course_name: course_name_by_id.get(&c.course_id).cloned().unwrap_or_default(),
            mass_start_time: c.mass_start_time,
        })
        .collect();

    let event = data.event();
    EventTemplate {
        format: event.format,
        stage_order: event.stage_order,
        time_precision: event.time_precision,
        dual_slalom_window: event.dual_slalom_window_seconds,
        controls,
        stages,
        courses,
        classes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timing_storage::{InMemoryRepository, NewEvent};

    fn new_event(repo: &InMemoryRepository) -> EventId {
        repo.create_event(NewEvent {
            name: "Test".into(),
            date: "2026-07-28".into(),
            location: None,
            format: RaceFormat::Enduro,
            stage_order: StageOrder::Fixed,
            time_precision: TimePrecision::Seconds,
            dual_slalom_window_seconds: None,
            upstream_competition_id: None,
        })
        .id
    }

    fn downhill_template() -> EventTemplate {
        serde_json::from_value(serde_json::json!({
            "format": "downhill",
            "stage_order": "fixed",
            "time_precision": "hundredths",
            "controls": [
                {"code": 12, "name": "Start", "type": "start"},
                {"code": 52, "name": "Finish", "type": "finish"},
            ],
            "stages": [
                {"stage_number": 1, "name": "DH", "start_control_code": 12, "finish_control_code": 52,
                 "is_timed": true, "runs_to_count": 1, "max_runs": 2},
            ],
            "courses": [
                {"name": "Downhill", "laps": 1, "stages_any_order": false, "allow_repeat": true, "stage_numbers": [1]},
            ],
            "classes": [
                {"name": "Open", "course_name": "Downhill"},
            ],
        }))
        .unwrap()
    }

    #[test]
    fn applies_a_full_template() {
        let repo = InMemoryRepository::new();
        let event_id = new_event(&repo);
        let report = apply_template(&repo, event_id, &downhill_template()).unwrap();
        assert!(report.warnings.is_empty());
        assert_eq!(report.imported, 5);
        repo.with_event(event_id, |data| {
            assert_eq!(data.event().format, RaceFormat::Downhill);
            assert_eq!(data.stages().len(), 1);
            assert_eq!(data.courses().len(), 1);
            assert_eq!(data.classes().len(), 1);
            assert_eq!(data.course_stage_order(data.courses()[0].id), vec![data.stages()[0].id]);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn dangling_stage_reference_becomes_a_warning_not_a_failure() {
        let repo = InMemoryRepository::new();
        let event_id = new_event(&repo);
        let mut template = downhill_template();
        template.courses[0].stage_numbers.push(99);
        let report = apply_template(&repo, event_id, &template).unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("99"));
    }

    #[test]
    fn reapplying_clears_previous_structure() {
        let repo = InMemoryRepository::new();
        let event_id = new_event(&repo);
        apply_template(&repo, event_id, &downhill_template()).unwrap();
        let mut second = downhill_template();
        second.classes.clear();
        apply_template(&repo, event_id, &second).unwrap();
        repo.with_event(event_id, |data| {
            assert!(data.classes().is_empty());
            assert_eq!(data.stages().len(), 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn export_then_import_on_an_empty_event_reproduces_the_template() {
        let repo = InMemoryRepository::new();
        let source_event = new_event(&repo);
        apply_template(&repo, source_event, &downhill_template()).unwrap();
        let exported = export_template(&repo, source_event).unwrap();

        let target_event = new_event(&repo);
        let report = apply_template(&repo, target_event, &exported).unwrap();
        assert!(report.warnings.is_empty());

        repo.with_event(target_event, |data| {
            assert_eq!(data.event().format, RaceFormat::Downhill);
            assert_eq!(data.event().time_precision, TimePrecision::Hundredths);
            let controls: Vec<(i64, &str)> = data.controls().iter().map(|c| (c.code, c.name.as_str())).collect();
            assert_eq!(controls, vec![(12, "Start"), (52, "Finish")]);
            assert_eq!(data.stages().len(), 1);
            assert_eq!(data.stages()[0].stage_number, 1);
            assert_eq!(data.stages()[0].max_runs, Some(2));
            assert_eq!(data.courses().len(), 1);
            assert_eq!(data.courses()[0].name, "Downhill");
            assert_eq!(data.course_stage_order(data.courses()[0].id), vec![data.stages()[0].id]);
            assert_eq!(data.classes().len(), 1);
            assert_eq!(data.classes()[0].name, "Open");
            Ok(())
        })
        .unwrap();
    }
}

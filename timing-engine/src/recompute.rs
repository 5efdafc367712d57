//! Bulk recompute: replay the immutable punch log from
//! scratch and diff against the prior snapshot. `recompute_all` is the
//! deterministic-replay guarantee's entry point.

use crate::{aggregator, grouper, ingest};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use timing_core::*;
use timing_storage::{EventData, Repository};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecomputeDiffKind {
    NewRun,
    MissingRun,
    ChangedElapsed,
    ChangedStatus,
    ChangedPosition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecomputeDiff {
    pub kind: RecomputeDiffKind,
    pub entry_id: EntryId,
    pub stage_id: Option<StageId>,
    pub detail: String,
}

/// `recompute_all(event) → diff_list`. Deletes all
/// `StageRun`/`OverallResult` rows for the event, replays every
/// non-duplicate punch in `(punch_time, id)` order through the
/// Assembler bypassing admission control, re-groups dual-slalom
/// starts, re-aggregates every entry, and reports what changed.
pub fn recompute_all(repo: &impl Repository, config: &TimingConfig, event_id: EventId, observer: &dyn ObserverSink) -> TimingResult<Vec<RecomputeDiff>> {
    repo.with_event(event_id, |data| recompute_locked(data, config, observer))
}

fn recompute_locked(data: &mut EventData, config: &TimingConfig, observer: &dyn ObserverSink) -> TimingResult<Vec<RecomputeDiff>> {
    let before_runs = snapshot_valid_runs(data);
    let before_results: HashMap<EntryId, OverallResult> = data
        .entries()
        .iter()
        .filter_map(|e| data.overall_result_for_entry(e.id).map(|r| (e.id, r.clone())))
        .collect();

    data.clear_stage_runs();
    data.clear_overall_results();

    let punches: Vec<Punch> = data
        .punches_in_replay_order()
        .into_iter()
        .filter(|p| !p.is_duplicate)
        .cloned()
        .collect();
    for punch in &punches {
        ingest::route_punch(data, config, punch, observer)?;
    }

    if data.event().format == RaceFormat::DualSlalom {
        let window = data.event().dual_slalom_window_seconds.unwrap_or(config.default_dual_slalom_window_seconds);
        let stage_ids: Vec<StageId> = data.stages().iter().map(|s| s.id).collect();
        for stage_id in stage_ids {
            let stage = data.stage(stage_id).cloned().expect("stage id from this event's own table");
            grouper::group_starts_locked(data, &stage, window);
        }
    }

    let entry_ids: Vec<EntryId> = data.entries().iter().map(|e| e.id).collect();
    for entry_id in entry_ids {
        aggregator::on_run_superseded(data, entry_id, observer)?;
    }

    let stage_ids: Vec<StageId> = data.stages().iter().map(|s| s.id).collect();
    for stage_id in stage_ids {
        let stage = data.stage(stage_id).cloned().expect("stage id from this event's own table");
        aggregator::emit_stage_status(data, &stage, observer);
    }

    Ok(diff_against(data, &before_runs, &before_results))
}

type RunKey = (EntryId, StageId, i32);

fn snapshot_valid_runs(data: &EventData) -> HashMap<RunKey, StageRun> {
    data.all_stage_runs()
        .iter()
        .filter(|r| r.run_state == RunState::Valid)
        .map(|r| ((r.entry_id, r.stage_id, r.attempt), r.clone()))
        .collect()
}

fn diff_against(data: &EventData, before_runs: &HashMap<RunKey, StageRun>, before_results: &HashMap<EntryId, OverallResult>) -> Vec<RecomputeDiff> {
    let mut diffs = Vec::new();
    let after_runs = snapshot_valid_runs(data);

    for (key, before) in before_runs {
        match after_runs.get(key) {
            None => diffs.push(RecomputeDiff {
                kind: RecomputeDiffKind::MissingRun,
                entry_id: key.0,
                stage_id: Some(key.1),
                detail: format!("attempt {} no longer valid", key.2),
            }),
            Some(after) => {
                let before_elapsed = before.elapsed_seconds.unwrap_or(0.0);
                let after_elapsed = after.elapsed_seconds.unwrap_or(0.0);
                if (before_elapsed - after_elapsed).abs() > 0.01 {
                    diffs.push(RecomputeDiff {
                        kind: RecomputeDiffKind::ChangedElapsed,
                        entry_id: key.0,
                        stage_id: Some(key.1),
                        detail: format!("{before_elapsed:.2}s -> {after_elapsed:.2}s"),
                    });
                }
            }
        }
    }
    for (key, _) in &after_runs {
        if !before_runs.contains_key(key) {
            diffs.push(RecomputeDiff {
                kind: RecomputeDiffKind::NewRun,
                entry_id: key.0,
                stage_id: Some(key.1),
                detail: format!("attempt {} now valid", key.2),
            });
        }
    }

    for entry in data.entries() {
        let after = data.overall_result_for_entry(entry.id);
        match (before_results.get(&entry.id), after) {
            (None, Some(_)) => {}
            (Some(before), Some(after)) => {
                if before.status != after.status {
                    diffs.push(RecomputeDiff {
                        kind: RecomputeDiffKind::ChangedStatus,
                        entry_id: entry.id,
                        stage_id: None,
                        detail: format!("{:?} -> {:?}", before.status, after.status),
                    });
                }
                if before.position != after.position {
                    diffs.push(RecomputeDiff {
                        kind: RecomputeDiffKind::ChangedPosition,
                        entry_id: entry.id,
                        stage_id: None,
                        detail: format!("{:?} -> {:?}", before.position, after.position),
                    });
                }
            }
            _ => {}
        }
    }
    diffs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use timing_storage::{InMemoryRepository, NewEvent};

    fn downhill_event() -> (InMemoryRepository, EventId, StageId, EntryId) {
        let repo = InMemoryRepository::new();
        let event = repo.create_event(NewEvent {
            name: "Test Downhill".into(),
            date: "2026-07-28".into(),
            location: None,
            format: RaceFormat::Downhill,
            stage_order: StageOrder::Fixed,
            time_precision: TimePrecision::Seconds,
            dual_slalom_window_seconds: None,
            upstream_competition_id: None,
        });
        let (stage_id, entry_id) = repo
            .with_event(event.id, |data| {
                data.set_event_status(EventStatus::Active);
                let start = data.insert_control(1, "Start".into(), ControlType::Start);
                let finish = data.insert_control(2, "Finish".into(), ControlType::Finish);
                let stage = data.insert_stage(1, "DH1".into(), start.id, finish.id, true, 1, None);
                let class = data.insert_class("Open".into(), CourseId::new(1), None);
                let entry = data.insert_entry(1, "A".into(), "Rider".into(), None, class.id);
                data.upsert_chip_mapping(entry.id, 100, true);
                Ok((stage.id, entry.id))
            })
            .unwrap();
        (repo, event.id, stage_id, entry_id)
    }

    #[test]
    fn recompute_is_a_fixed_point() {
        let (repo, event_id, _stage_id, _entry_id) = downhill_event();
        let t0 = Utc::now();
        repo.with_event(event_id, |data| {
            data.insert_punch(100, 1, t0, PunchSource::Usb, None, false);
            data.insert_punch(100, 2, t0 + Duration::seconds(45), PunchSource::Usb, None, false);
            Ok(())
        })
        .unwrap();

        let first = recompute_all(&repo, &TimingConfig::default(), event_id, &NullObserverSink).unwrap();
        assert!(!first.is_empty());
        let second = recompute_all(&repo, &TimingConfig::default(), event_id, &NullObserverSink).unwrap();
        assert!(second.is_empty(), "recompute should be a fixed point after the first pass: {second:?}");
    }
}

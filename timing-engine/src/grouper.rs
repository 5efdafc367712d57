//! Dual-slalom start grouper. Invoked explicitly, not per
//! punch: normalizes mass-start fairness by snapping every rider in a
//! group to the group's earliest start punch.

use timing_core::*;
use timing_storage::{EventData, Repository};

/// Group start punches on `stage`'s start control within `window_seconds`
/// of each other and normalize every dependent `StageRun`'s
/// `start_time` to the earliest punch in its group. Returns the number
/// of groups of size ≥ 2 that were normalized. Idempotent: punches are
/// never mutated, so re-running reproduces the same groups.
pub fn group_dual_slalom_starts(repo: &impl Repository, event_id: EventId, stage_id: StageId, window_seconds: f64) -> TimingResult<usize> {
    repo.with_event(event_id, |data| {
        let stage = data.stage(stage_id).cloned().ok_or(StorageError::NotFound {
            entity: "stage",
            id: stage_id.raw(),
        })?;
        Ok(group_starts_locked(data, &stage, window_seconds))
    })
}

pub(crate) fn group_starts_locked(data: &mut EventData, stage: &Stage, window_seconds: f64) -> usize {
    let Some(start_code) = data.control(stage.start_control_id).map(|c| c.code) else {
        return 0;
    };
    let mut starts: Vec<Punch> = data
        .punches()
        .iter()
        .filter(|p| p.control_code == start_code && !p.is_duplicate)
        .cloned()
        .collect();
    starts.sort_by_key(|p| p.punch_time);

    let mut groups: Vec<Vec<Punch>> = Vec::new();
    for punch in starts {
        let fits_current_group = groups
            .last()
            .map(|g| seconds_between(g[0].punch_time, punch.punch_time) <= window_seconds)
            .unwrap_or(false);
        if fits_current_group {
            groups.last_mut().unwrap().push(punch);
        } else {
            groups.push(vec![punch]);
        }
    }

    let mut normalized_groups = 0;
    for group in groups.into_iter().filter(|g| g.len() >= 2) {
        normalized_groups += 1;
        let earliest = group[0].punch_time;
        for punch in &group {
            let runs: Vec<StageRun> = data
                .all_stage_runs()
                .iter()
                .filter(|r| r.stage_id == stage.id && r.start_punch_id == Some(punch.id))
                .cloned()
                .collect();
            for mut run in runs {
                run.start_time = Some(earliest);
                if let Some(finish) = run.finish_time {
                    run.elapsed_seconds = Some(seconds_between(earliest, finish));
                }
                let _ = data.update_stage_run(run);
            }
        }
    }
    normalized_groups
}

fn seconds_between(a: Timestamp, b: Timestamp) -> f64 {
    (b - a).num_milliseconds() as f64 / 1000.0
}

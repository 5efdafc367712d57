//! Run Assembler: owns the `StageRun` state machine —
//! source-priority override, the nine-row state table, cross-chip
//! completion, and finalize.

use crate::aggregator;
use serde_json::json;
use timing_core::*;
use timing_storage::EventData;

/// Handle one accepted punch resolved to `(entry, stage, side)`.
pub fn handle_punch(
    data: &mut EventData,
    config: &TimingConfig,
    stage: &Stage,
    entry_id: EntryId,
    side: StageSide,
    punch: &Punch,
    observer: &dyn ObserverSink,
) -> TimingResult<()> {
    if let Some(overridden) = find_overridable_run(data, entry_id, stage.id, side, punch) {
        apply_override(data, config, stage, entry_id, overridden, side, punch, observer)?;
    } else {
        let latest = data.active_runs_for(entry_id, stage.id).last().cloned();
        apply_state_machine(data, config, stage, entry_id, side, punch, latest, observer)?;
    }
    try_cross_chip_completion(data, config, stage, entry_id, observer)?;
    Ok(())
}

/// A valid run whose punch on `side` has a strictly weaker source than
/// the incoming punch.
fn find_overridable_run(
    data: &EventData,
    entry_id: EntryId,
    stage_id: StageId,
    side: StageSide,
    punch: &Punch,
) -> Option<StageRun> {
    data.active_runs_for(entry_id, stage_id)
        .into_iter()
        .find(|r| {
            if r.run_state != RunState::Valid {
                return false;
            }
            let existing_punch_id = match side {
                StageSide::Start => r.start_punch_id,
                StageSide::Finish => r.finish_punch_id,
            };
            existing_punch_id
                .and_then(|pid| data.punch(pid))
                .map(|existing| existing.source.priority() > punch.source.priority())
                .unwrap_or(false)
        })
        .cloned()
}

#[allow(clippy::too_many_arguments)]
fn apply_override(
    data: &mut EventData,
    config: &TimingConfig,
    stage: &Stage,
    entry_id: EntryId,
    overridden: StageRun,
    side: StageSide,
    punch: &Punch,
    observer: &dyn ObserverSink,
) -> TimingResult<()> {
    let mut superseded = overridden.clone();
    superseded.run_state = RunState::Superseded;
    data.update_stage_run(superseded)?;
    data.append_journal(
        JournalKind::RunSuperseded,
        json!({
            "entry_id": entry_id.raw(),
            "stage_id": stage.id.raw(),
            "attempt": overridden.attempt,
            "reason": format!("{}_override", punch.source),
        }),
    );

    let attempt = data.next_attempt_number(entry_id, stage.id);
    let (start_punch_id, finish_punch_id, start_time, finish_time) = match side {
        StageSide::Start => (Some(punch.id), overridden.finish_punch_id, Some(punch.punch_time), overridden.finish_time),
        StageSide::Finish => (overridden.start_punch_id, Some(punch.id), overridden.start_time, Some(punch.punch_time)),
    };
    let new_run = data.insert_stage_run(
        entry_id,
        stage.id,
        attempt,
        start_punch_id,
        finish_punch_id,
        start_time,
        finish_time,
        None,
        RunStatus::Pending,
        RunState::Pending,
    );
    try_finalize(data, config, stage, new_run, observer, None)
}

#[allow(clippy::too_many_arguments)]
fn apply_state_machine(
    data: &mut EventData,
    config: &TimingConfig,
    stage: &Stage,
    entry_id: EntryId,
    side: StageSide,
    punch: &Punch,
    latest: Option<StageRun>,
    observer: &dyn ObserverSink,
) -> TimingResult<()> {
    match (latest, side) {
        (None, StageSide::Start) => {
            start_new_attempt(data, stage, entry_id, Some(punch), None);
        }
        (None, StageSide::Finish) => {
            start_new_attempt(data, stage, entry_id, None, Some(punch));
        }
        (Some(run), StageSide::Start) if run.status == RunStatus::Ok => {
            let attempts_so_far = data.stage_runs_for(entry_id, stage.id).len() as i32;
            if stage.max_runs.map(|m| attempts_so_far < m).unwrap_or(true) {
                start_new_attempt(data, stage, entry_id, Some(punch), None);
            }
        }
        (Some(mut run), StageSide::Start)
            if run.run_state == RunState::Pending && run.start_time.is_some() && run.finish_time.is_none() =>
        {
            if punch.punch_time > run.start_time.unwrap() {
                run.start_punch_id = Some(punch.id);
                run.start_time = Some(punch.punch_time);
                data.update_stage_run(run)?;
            }
        }
        (Some(mut run), StageSide::Start)
            if run.run_state == RunState::Pending && run.finish_time.is_some() && run.start_time.is_none() =>
        {
            run.start_punch_id = Some(punch.id);
            run.start_time = Some(punch.punch_time);
            data.update_stage_run(run.clone())?;
            try_finalize(data, config, stage, run, observer, None)?;
        }
        (Some(mut run), StageSide::Finish)
            if run.run_state == RunState::Pending && run.start_time.is_some() && run.finish_time.is_none() =>
        {
            if punch.punch_time >= run.start_time.unwrap() {
                run.finish_punch_id = Some(punch.id);
                run.finish_time = Some(punch.punch_time);
                data.update_stage_run(run.clone())?;
                try_finalize(data, config, stage, run, observer, None)?;
            }
        }
        (Some(mut run), StageSide::Finish)
            if run.run_state == RunState::Pending && run.finish_time.is_some() && run.start_time.is_none() =>
        {
            if punch.punch_time > run.finish_time.unwrap() {
                run.finish_punch_id = Some(punch.id);
                run.finish_time = Some(punch.punch_time);
                data.update_stage_run(run)?;
            }
        }
        (Some(_run), StageSide::Finish) => {
            // latest.status == ok (rider must begin a new attempt first)
            // or latest is a terminal dns/dnf/dsq: discard either way.
        }
        _ => {
            // Terminal (dns/dnf/dsq) latest run, start side: no further
            // assembly for this stage until a manual correction clears it.
        }
    }
    Ok(())
}

fn start_new_attempt(data: &mut EventData, stage: &Stage, entry_id: EntryId, start: Option<&Punch>, finish: Option<&Punch>) {
    let attempt = data.next_attempt_number(entry_id, stage.id);
    data.insert_stage_run(
        entry_id,
        stage.id,
        attempt,
        start.map(|p| p.id),
        finish.map(|p| p.id),
        start.map(|p| p.punch_time),
        finish.map(|p| p.punch_time),
        None,
        RunStatus::Pending,
        RunState::Pending,
    );
}

/// Write `elapsed_seconds`/`status`/`run_state` when both sides are
/// present and non-negative, append `run_created`, and trigger the
/// Aggregator.
fn try_finalize(
    data: &mut EventData,
    config: &TimingConfig,
    stage: &Stage,
    mut run: StageRun,
    observer: &dyn ObserverSink,
    source_hint: Option<&str>,
) -> TimingResult<()> {
    let (Some(start), Some(finish)) = (run.start_time, run.finish_time) else {
        return Ok(());
    };
    let elapsed = (finish - start).num_milliseconds() as f64 / 1000.0;
    if elapsed < 0.0 {
        tracing::debug!(stage_run_id = run.id.raw(), "finalize skipped: negative elapsed");
        return Ok(());
    }
    run.elapsed_seconds = Some(elapsed);
    run.status = RunStatus::Ok;
    run.run_state = RunState::Valid;
    data.update_stage_run(run.clone())?;

    let mut payload = json!({
        "entry_id": run.entry_id.raw(),
        "stage_id": run.stage_id.raw(),
        "attempt": run.attempt,
        "elapsed_seconds": elapsed,
    });
    if let Some(hint) = source_hint {
        payload["source_hint"] = json!(hint);
    }
    data.append_journal(JournalKind::RunCreated, payload);

    aggregator::on_run_finalized(data, config, stage, &run, observer)
}

/// After any update leaves a run `pending` with exactly one side
/// missing and the entry has ≥2 chip mappings, search all the entry's
/// chips for the missing side.
fn try_cross_chip_completion(
    data: &mut EventData,
    config: &TimingConfig,
    stage: &Stage,
    entry_id: EntryId,
    observer: &dyn ObserverSink,
) -> TimingResult<()> {
    let chip_ids: Vec<i64> = data.chip_mappings_for_entry(entry_id).iter().map(|m| m.chip_id).collect();
    if chip_ids.len() < 2 {
        return Ok(());
    }
    let pending: Vec<StageRun> = data
        .active_runs_for(entry_id, stage.id)
        .into_iter()
        .filter(|r| r.run_state == RunState::Pending && (r.start_time.is_none() ^ r.finish_time.is_none()))
        .cloned()
        .collect();

    for mut run in pending {
        if run.start_time.is_none() {
            let finish_time = run.finish_time.expect("exactly one side missing");
            if let Some(fill) = best_cross_chip_punch(data, &chip_ids, stage.start_control_id, finish_time, true) {
                run.start_punch_id = Some(fill.id);
                run.start_time = Some(fill.punch_time);
                data.update_stage_run(run.clone())?;
                try_finalize(data, config, stage, run, observer, Some("cross_chip_fill"))?;
            }
        } else {
            let start_time = run.start_time.expect("exactly one side missing");
            if let Some(fill) = best_cross_chip_punch(data, &chip_ids, stage.finish_control_id, start_time, false) {
                run.finish_punch_id = Some(fill.id);
                run.finish_time = Some(fill.punch_time);
                data.update_stage_run(run.clone())?;
                try_finalize(data, config, stage, run, observer, Some("cross_chip_fill"))?;
            }
        }
    }
    Ok(())
}

/// The closest non-duplicate punch on `control_id` from any of the
/// entry's chips that keeps elapsed non-negative: the latest start at
/// or before `anchor` when filling a start, the earliest finish at or
/// after `anchor` when filling a finish.
fn best_cross_chip_punch(
    data: &EventData,
    chip_ids: &[i64],
    control_id: ControlId,
    anchor: Timestamp,
    looking_for_start: bool,
) -> Option<Punch> {
    let control_code = data.control(control_id)?.code;
    let mut candidates: Vec<Punch> = data
        .punches()
        .iter()
        .filter(|p| chip_ids.contains(&p.chip_id) && p.control_code == control_code && !p.is_duplicate)
        .filter(|p| {
            if looking_for_start {
                p.punch_time <= anchor
            } else {
                p.punch_time >= anchor
            }
        })
        .cloned()
        .collect();
    candidates.sort_by_key(|p| p.punch_time);
    if looking_for_start {
        candidates.into_iter().last()
    } else {
        candidates.into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use timing_storage::{InMemoryRepository, NewEvent, Repository};

    fn setup() -> (InMemoryRepository, EventId, StageId) {
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
        let stage_id = repo
            .with_event(event.id, |data| {
                data.set_event_status(EventStatus::Active);
                let start = data.insert_control(1, "Start".into(), ControlType::Start);
                let finish = data.insert_control(2, "Finish".into(), ControlType::Finish);
                Ok(data.insert_stage(1, "DH1".into(), start.id, finish.id, true, 1, Some(3)).id)
            })
            .unwrap();
        (repo, event.id, stage_id)
    }

    #[test]
    fn start_then_finish_finalizes() {
        let (repo, event_id, stage_id) = setup();
        let class = repo.with_event(event_id, |data| Ok(data.insert_class("Open".into(), CourseId::new(1), None))).unwrap();
        let entry = repo
            .with_event(event_id, |data| Ok(data.insert_entry(1, "A".into(), "Rider".into(), None, class.id)))
            .unwrap();
        let t0 = Utc::now();
        repo.with_event(event_id, |data| {
            let stage = data.stage(stage_id).unwrap().clone();
            let p = data.insert_punch(100, 1, t0, PunchSource::Usb, None, false);
            handle_punch(data, &TimingConfig::default(), &stage, entry.id, StageSide::Start, &p, &NullObserverSink)
        })
        .unwrap();
        repo.with_event(event_id, |data| {
            let stage = data.stage(stage_id).unwrap().clone();
            let p = data.insert_punch(100, 2, t0 + Duration::seconds(45), PunchSource::Usb, None, false);
            handle_punch(data, &TimingConfig::default(), &stage, entry.id, StageSide::Finish, &p, &NullObserverSink)
        })
        .unwrap();
        repo.with_event(event_id, |data| {
            let run = data.active_runs_for(entry.id, stage_id)[0];
            assert_eq!(run.elapsed_seconds, Some(45.0));
            assert_eq!(run.status, RunStatus::Ok);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn fourth_start_past_max_runs_is_discarded() {
        let (repo, event_id, stage_id) = setup();
        let class = repo.with_event(event_id, |data| Ok(data.insert_class("Open".into(), CourseId::new(1), None))).unwrap();
        let entry = repo
            .with_event(event_id, |data| Ok(data.insert_entry(1, "A".into(), "Rider".into(), None, class.id)))
            .unwrap();
        let t0 = Utc::now();
        for attempt in 0..3 {
            let base = t0 + Duration::seconds(attempt * 100);
            repo.with_event(event_id, |data| {
                let stage = data.stage(stage_id).unwrap().clone();
                let p = data.insert_punch(100, 1, base, PunchSource::Usb, None, false);
                handle_punch(data, &TimingConfig::default(), &stage, entry.id, StageSide::Start, &p, &NullObserverSink)?;
                let p = data.insert_punch(100, 2, base + Duration::seconds(45), PunchSource::Usb, None, false);
                handle_punch(data, &TimingConfig::default(), &stage, entry.id, StageSide::Finish, &p, &NullObserverSink)
            })
            .unwrap();
        }
        repo.with_event(event_id, |data| {
            let stage = data.stage(stage_id).unwrap().clone();
            let p = data.insert_punch(100, 1, t0 + Duration::seconds(1000), PunchSource::Usb, None, false);
            handle_punch(data, &TimingConfig::default(), &stage, entry.id, StageSide::Start, &p, &NullObserverSink)
        })
        .unwrap();
        repo.with_event(event_id, |data| {
            assert_eq!(data.stage_runs_for(entry.id, stage_id).len(), 3);
            Ok(())
        })
        .unwrap();
    }
}

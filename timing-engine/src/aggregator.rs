//! Aggregator: per-stage counting time, per-format overall total, and
//! per-class ranking, plus the highlight generation this crate folds in
//! alongside it (grounded in `api/websocket.py::generate_highlights`).

use std::cmp::Ordering;
use std::collections::HashMap;
use timing_core::*;
use timing_storage::EventData;

/// Recompute `OverallResult` for the whole class a finalized run's
/// entry belongs to, then check for a podium highlight. Called after
/// every finalize and every supersede.
pub fn on_run_finalized(
    data: &mut EventData,
    config: &TimingConfig,
    stage: &Stage,
    run: &StageRun,
    observer: &dyn ObserverSink,
) -> TimingResult<()> {
    check_stage_highlights(data, config, stage, run, observer);
    emit_stage_status(data, stage, observer);
    recompute_class(data, run.entry_id, observer)
}

/// Broadcast a `stage_status` snapshot: riders still out, riders
/// finished, and the current leader on this stage. Grounded in
/// `api/websocket.py::broadcast_stage_status`.
pub fn emit_stage_status(data: &EventData, stage: &Stage, observer: &dyn ObserverSink) {
    let runs: Vec<&StageRun> = data
        .all_stage_runs()
        .iter()
        .filter(|r| r.stage_id == stage.id && r.run_state != RunState::Superseded)
        .collect();
    let riders_on_course = runs.iter().filter(|r| r.run_state == RunState::Pending).count() as i32;

    let mut finished_entries = std::collections::HashSet::new();
    let mut leader: Option<(EntryId, f64)> = None;
    for r in runs.iter().filter(|r| r.run_state == RunState::Valid) {
        finished_entries.insert(r.entry_id);
        if let Some(t) = r.counting_time() {
            if leader.map(|(_, lt)| t < lt).unwrap_or(true) {
                leader = Some((r.entry_id, t));
            }
        }
    }
    let riders_finished = finished_entries.len() as i32;
    let status = if riders_on_course > 0 {
        "live"
    } else if riders_finished > 0 {
        "complete"
    } else {
        "pending"
    };
    let leader_bib = leader.and_then(|(eid, _)| data.entry(eid)).map(|e| e.bib);

    observer.notify(ObserverEvent::StageStatus {
        stage_id: stage.id,
        name: stage.name.clone(),
        status,
        riders_on_course,
        riders_finished,
        leader_bib,
    });
}

pub fn on_run_superseded(data: &mut EventData, entry_id: EntryId, observer: &dyn ObserverSink) -> TimingResult<()> {
    recompute_class(data, entry_id, observer)
}

/// `new_leader` when this run's counting time is now the best `ok` time
/// on the stage and at least one other entry already has an `ok`
/// result; `close_finish` when it is not the leader but within
/// `close_finish_threshold_seconds` of it.
fn check_stage_highlights(data: &EventData, config: &TimingConfig, stage: &Stage, run: &StageRun, observer: &dyn ObserverSink) {
    let Some(this_time) = run.counting_time() else { return };
    let best_per_entry: Vec<(EntryId, f64)> = data
        .all_stage_runs()
        .iter()
        .filter(|r| r.stage_id == stage.id && r.run_state == RunState::Valid)
        .filter_map(|r| r.counting_time().map(|t| (r.entry_id, t)))
        .collect();
    let Some(&(leader_entry, leader_time)) = best_per_entry
        .iter()
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
    else {
        return;
    };
    let had_other_finisher = best_per_entry.iter().any(|(e, _)| *e != run.entry_id);
    let Some(entry) = data.entry(run.entry_id) else { return };

    if leader_entry == run.entry_id && had_other_finisher {
        observer.notify(ObserverEvent::Highlight {
            category: HighlightCategory::NewLeader,
            text: format!("Bib {} takes the lead on stage {}", entry.bib, stage.stage_number),
            bib: entry.bib,
            stage_number: Some(stage.stage_number),
            priority: HighlightPriority::High,
        });
    } else if leader_entry != run.entry_id && (this_time - leader_time) <= config.close_finish_threshold_seconds {
        observer.notify(ObserverEvent::Highlight {
            category: HighlightCategory::CloseFinish,
            text: format!("Bib {} finishes within {:.1}s of the stage leader", entry.bib, config.close_finish_threshold_seconds),
            bib: entry.bib,
            stage_number: Some(stage.stage_number),
            priority: HighlightPriority::Normal,
        });
    }
}

/// Recompute `OverallResult` for every entry in `entry_id`'s class,
/// re-rank, broadcast standings, and raise `podium` highlights for
/// entries newly in the top 3. Re-rank scope is always the whole class,
/// not just the changed entry.
fn recompute_class(data: &mut EventData, entry_id: EntryId, observer: &dyn ObserverSink) -> TimingResult<()> {
    let Some(entry) = data.entry(entry_id).cloned() else { return Ok(()) };
    let Some(class) = data.class(entry.class_id).cloned() else { return Ok(()) };
    let format = data.event().format;
    let stage_ids = data.course_stage_order(class.course_id);
    let entry_ids: Vec<EntryId> = data.entries_in_class(class.id).iter().map(|e| e.id).collect();

    let prior_positions: HashMap<EntryId, Option<i32>> = entry_ids
        .iter()
        .map(|&id| (id, data.overall_result_for_entry(id).and_then(|r| r.position)))
        .collect();

    for &eid in &entry_ids {
        let (total, status) = compute_total(data, format, &stage_ids, eid);
        data.upsert_overall_result(eid, total, None, None, status);
    }

    rank_class(data, class.id);

    let rows = standings_rows(data, class.id);
    observer.notify(ObserverEvent::Standings {
        event_id: data.event().id,
        class_id: class.id,
        rows,
    });

    for &eid in &entry_ids {
        let new_position = data.overall_result_for_entry(eid).and_then(|r| r.position);
        let was_podium = prior_positions.get(&eid).copied().flatten().map(|p| p <= 3).unwrap_or(false);
        let is_podium = new_position.map(|p| p <= 3).unwrap_or(false);
        if is_podium && !was_podium {
            if let Some(e) = data.entry(eid) {
                observer.notify(ObserverEvent::Highlight {
                    category: HighlightCategory::Podium,
                    text: format!("Bib {} moves onto the podium", e.bib),
                    bib: e.bib,
                    stage_number: None,
                    priority: HighlightPriority::High,
                });
            }
        }
    }
    Ok(())
}

/// Dispatch on race format.
fn compute_total(data: &EventData, format: RaceFormat, stage_ids: &[StageId], entry_id: EntryId) -> (Option<f64>, RunStatus) {
    if let Some(status) = terminal_entry_status(data, entry_id) {
        return (None, status);
    }
    match format {
        RaceFormat::Enduro | RaceFormat::Xc => compute_enduro_total(data, stage_ids, entry_id),
        RaceFormat::Downhill | RaceFormat::DualSlalom => compute_single_stage_total(data, stage_ids, entry_id),
    }
}

/// Entry-level terminal status overrides all computation (see
/// DESIGN.md for the rationale).
fn terminal_entry_status(data: &EventData, entry_id: EntryId) -> Option<RunStatus> {
    match data.entry(entry_id)?.status {
        EntryStatus::Dns => Some(RunStatus::Dns),
        EntryStatus::Dnf => Some(RunStatus::Dnf),
        EntryStatus::Dsq => Some(RunStatus::Dsq),
        EntryStatus::Registered => None,
    }
}

/// A `dns`/`dnf`/`dsq` `StageRun` at `attempt = 1` on any counted stage
/// propagates to the overall.
fn terminal_status_at_attempt_one(data: &EventData, entry_id: EntryId, stage_id: StageId) -> Option<RunStatus> {
    data.stage_runs_for(entry_id, stage_id)
        .into_iter()
        .find(|r| r.attempt == 1 && r.run_state != RunState::Superseded && matches!(r.status, RunStatus::Dns | RunStatus::Dnf | RunStatus::Dsq))
        .map(|r| r.status)
}

fn compute_enduro_total(data: &EventData, stage_ids: &[StageId], entry_id: EntryId) -> (Option<f64>, RunStatus) {
    for &stage_id in stage_ids {
        if let Some(status) = terminal_status_at_attempt_one(data, entry_id, stage_id) {
            return (None, status);
        }
    }
    let mut total = 0.0;
    let mut pending_any = false;
    for &stage_id in stage_ids {
        let Some(stage) = data.stage(stage_id) else { continue };
        if !stage.is_timed {
            continue;
        }
        match counting_time_for_stage(data, stage, entry_id) {
            Some(t) => total += t,
            None => pending_any = true,
        }
    }
    if pending_any {
        (None, RunStatus::Pending)
    } else {
        (Some(total), RunStatus::Ok)
    }
}

fn compute_single_stage_total(data: &EventData, stage_ids: &[StageId], entry_id: EntryId) -> (Option<f64>, RunStatus) {
    for &stage_id in stage_ids {
        if let Some(status) = terminal_status_at_attempt_one(data, entry_id, stage_id) {
            return (None, status);
        }
    }
    let Some(stage_id) = stage_ids.iter().find(|&&sid| data.stage(sid).map(|s| s.is_timed).unwrap_or(false)) else {
        return (None, RunStatus::Pending);
    };
    let best = data
        .stage_runs_for(entry_id, *stage_id)
        .into_iter()
        .filter(|r| r.run_state == RunState::Valid)
        .filter_map(|r| r.counting_time())
        .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a: f64| a.min(t))));
    match best {
        Some(t) => (Some(t), RunStatus::Ok),
        None => (None, RunStatus::Pending),
    }
}

/// Sum of the best `k` valid counting times for `runs_to_count=k`, the
/// single best when `k=1`, or `None` ("not ready") when fewer than `k`
/// valid runs exist yet.
fn counting_time_for_stage(data: &EventData, stage: &Stage, entry_id: EntryId) -> Option<f64> {
    let mut times: Vec<f64> = data
        .stage_runs_for(entry_id, stage.id)
        .into_iter()
        .filter(|r| r.run_state == RunState::Valid)
        .filter_map(|r| r.counting_time())
        .collect();
    times.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let k = stage.effective_runs_to_count() as usize;
    if k == 1 {
        times.first().copied()
    } else if times.len() >= k {
        Some(times[..k].iter().sum())
    } else {
        None
    }
}

/// Order `ok < pending < others`, then `total_seconds` ascending.
/// Positions are assigned sequentially starting at 1 to `ok` rows only
/// (sequential by default; see DESIGN.md for the tie-break rationale).
fn rank_class(data: &mut EventData, class_id: ClassId) {
    let mut results: Vec<OverallResult> = data.overall_results_for_class(class_id).into_iter().cloned().collect();
    results.sort_by(|a, b| status_rank(a.status).cmp(&status_rank(b.status)).then_with(|| {
        a.total_seconds
            .partial_cmp(&b.total_seconds)
            .unwrap_or(Ordering::Equal)
    }));

    let leader_time = results.iter().find(|r| r.status == RunStatus::Ok).and_then(|r| r.total_seconds);
    let mut position = 0;
    for r in results.iter_mut() {
        if r.status == RunStatus::Ok {
            position += 1;
            r.position = Some(position);
            r.time_behind = leader_time.zip(r.total_seconds).map(|(lt, t)| t - lt);
        } else {
            r.position = None;
            r.time_behind = None;
        }
    }
    for r in results {
        data.upsert_overall_result(r.entry_id, r.total_seconds, r.position, r.time_behind, r.status);
    }
}

fn status_rank(status: RunStatus) -> u8 {
    match status {
        RunStatus::Ok => 0,
        RunStatus::Pending => 1,
        RunStatus::Dns | RunStatus::Dnf | RunStatus::Dsq => 2,
    }
}

fn standings_rows(data: &EventData, class_id: ClassId) -> Vec<StandingsRow> {
    let mut results: Vec<OverallResult> = data.overall_results_for_class(class_id).into_iter().cloned().collect();
    results.sort_by_key(|r| r.position.unwrap_or(i32::MAX));
    results
        .into_iter()
        .filter_map(|r| {
            let entry = data.entry(r.entry_id)?;
            Some(StandingsRow {
                position: r.position,
                bib: entry.bib,
                total_seconds: r.total_seconds,
                time_behind: r.time_behind,
                status: r.status,
            })
        })
        .collect()
}

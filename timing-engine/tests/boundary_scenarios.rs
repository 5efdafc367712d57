//! Integration tests for race-day scenarios with no counterpart among
//! the unit tests colocated with the modules they exercise: an 8-rider
//! single-stage enduro fixture, source-priority override, and
//! cross-chip completion. Multi-run downhill, sum-of-best, and
//! dual-slalom grouping are covered by `aggregator.rs`'s and
//! `grouper.rs`'s own `#[cfg(test)]` modules.

use chrono::{Duration, Utc};
use timing_engine::ingest_punch;
use timing_test_utils::*;

/// Eight riders, one timed stage, one start/finish punch each, with
/// per-bib elapsed times chosen to exercise a spread of attempt
/// durations in a single pass of ingest.
#[test]
fn eight_rider_enduro_matches_expected_elapsed_per_bib() {
    let repo = InMemoryRepository::new();
    let event = fixtures::single_stage_event(&repo, RaceFormat::Enduro, 1, None);
    fixtures::register_entries(&repo, event.event_id, event.class_id, 8);

    let expected: [(i64, f64); 8] = [
        (1, 20.0),
        (2, 58.0),
        (3, 42.0),
        (4, 66.0),
        (5, 336.0),
        (6, 65.0),
        (7, 66.0),
        (8, 46.0),
    ];

    repo.with_event(event.event_id, |data| {
        for (bib, _) in expected {
            data.upsert_chip_mapping(data.entry_by_bib(bib).unwrap().id, 1000 + bib, true);
        }
        Ok(())
    })
    .unwrap();

    let t0 = Utc::now();
    let config = TimingConfig::default();
    for (bib, elapsed) in expected {
        let start = t0 + Duration::seconds(bib * 100);
        let finish = start + Duration::milliseconds((elapsed * 1000.0) as i64);
        ingest_punch(&repo, &config, event.event_id, 1000 + bib, 100, start, PunchSource::Roc, None, &NullObserverSink).unwrap();
        ingest_punch(&repo, &config, event.event_id, 1000 + bib, 200, finish, PunchSource::Roc, None, &NullObserverSink).unwrap();
    }

    repo.with_event(event.event_id, |data| {
        for (bib, elapsed) in expected {
            let entry_id = data.entry_by_bib(bib).unwrap().id;
            let run = data.active_runs_for(entry_id, event.stage_id)[0];
            assert_eq!(run.elapsed_seconds, Some(elapsed), "bib {bib} elapsed mismatch");
            assert_eq!(run.status, RunStatus::Ok);

            let overall = data.overall_result_for_entry(entry_id).unwrap();
            assert_eq!(overall.total_seconds, Some(elapsed), "bib {bib} overall total mismatch");
            assert_eq!(overall.status, RunStatus::Ok);
        }
        Ok(())
    })
    .unwrap();
}

/// A `roc` pair produces a valid 30s run; a higher-priority `usb`
/// finish supersedes it at 28s; a subsequent lower-priority `manual`
/// finish must NOT override the `usb` run.
#[test]
fn source_priority_override_chain() {
    let repo = InMemoryRepository::new();
    let event = fixtures::single_stage_event(&repo, RaceFormat::Downhill, 1, None);
    let entries = fixtures::register_entries(&repo, event.event_id, event.class_id, 1);
    let entry_id = entries[0];
    repo.with_event(event.event_id, |data| {
        data.upsert_chip_mapping(entry_id, 500, true);
        Ok(())
    })
    .unwrap();

    let t0 = Utc::now();
    let config = TimingConfig::default();
    ingest_punch(&repo, &config, event.event_id, 500, 100, t0, PunchSource::Roc, None, &NullObserverSink).unwrap();
    ingest_punch(
        &repo,
        &config,
        event.event_id,
        500,
        200,
        t0 + Duration::seconds(30),
        PunchSource::Roc,
        None,
        &NullObserverSink,
    )
    .unwrap();

    repo.with_event(event.event_id, |data| {
        let run = data.active_runs_for(entry_id, event.stage_id)[0];
        assert_eq!(run.elapsed_seconds, Some(30.0));
        assert_eq!(run.run_state, RunState::Valid);
        Ok(())
    })
    .unwrap();

    ingest_punch(
        &repo,
        &config,
        event.event_id,
        500,
        200,
        t0 + Duration::seconds(28),
        PunchSource::Usb,
        None,
        &NullObserverSink,
    )
    .unwrap();

    repo.with_event(event.event_id, |data| {
        let active = data.active_runs_for(entry_id, event.stage_id);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].elapsed_seconds, Some(28.0));

        let superseded = data
            .stage_runs_for(entry_id, event.stage_id)
            .into_iter()
            .find(|r| r.run_state == RunState::Superseded)
            .expect("original roc run should be superseded");
        assert_eq!(superseded.elapsed_seconds, Some(30.0));
        Ok(())
    })
    .unwrap();

    ingest_punch(
        &repo,
        &config,
        event.event_id,
        500,
        200,
        t0 + Duration::seconds(25),
        PunchSource::Manual,
        None,
        &NullObserverSink,
    )
    .unwrap();

    repo.with_event(event.event_id, |data| {
        let active = data.active_runs_for(entry_id, event.stage_id);
        assert_eq!(active.len(), 1, "manual finish must not override the usb-backed run");
        assert_eq!(active[0].elapsed_seconds, Some(28.0));
        Ok(())
    })
    .unwrap();
}

/// A rider's secondary chip punches the finish
/// control before that chip is mapped to the entry, so it is stored raw
/// and unrouted. Once the secondary chip is mapped and the rider's
/// primary chip punches the start control, the Assembler's cross-chip
/// search should find that earlier raw finish punch in the log, fill
/// the pending run, and finalize it with a `cross_chip_fill` source
/// hint in the journal — exactly the case ordinary per-punch routing
/// cannot handle on its own, since the finish punch arrived before the
/// entry had any run to attach it to.
#[test]
fn cross_chip_completion_fills_missing_finish() {
    let repo = InMemoryRepository::new();
    let event = fixtures::single_stage_event(&repo, RaceFormat::Enduro, 1, None);
    let entries = fixtures::register_entries(&repo, event.event_id, event.class_id, 1);
    let entry_id = entries[0];
    repo.with_event(event.event_id, |data| {
        data.upsert_chip_mapping(entry_id, 700, true);
        Ok(())
    })
    .unwrap();

    let t0 = Utc::now();
    let config = TimingConfig::default();

    // Secondary chip punches the finish control before it is mapped to
    // the entry: stored raw, not routed to any run.
    ingest_punch(
        &repo,
        &config,
        event.event_id,
        701,
        200,
        t0 + Duration::seconds(45),
        PunchSource::Usb,
        None,
        &NullObserverSink,
    )
    .unwrap();
    repo.with_event(event.event_id, |data| {
        assert!(data.active_runs_for(entry_id, event.stage_id).is_empty());
        data.upsert_chip_mapping(entry_id, 701, false);
        Ok(())
    })
    .unwrap();

    // Primary chip's start punch creates the pending run; the Assembler's
    // cross-chip search then finds the already-stored finish punch.
    ingest_punch(&repo, &config, event.event_id, 700, 100, t0, PunchSource::Usb, None, &NullObserverSink).unwrap();

    repo.with_event(event.event_id, |data| {
        let run = data.active_runs_for(entry_id, event.stage_id)[0];
        assert_eq!(run.elapsed_seconds, Some(45.0));
        assert_eq!(run.status, RunStatus::Ok);

        let created = data
            .journal()
            .iter()
            .find(|j| j.kind == JournalKind::RunCreated && j.payload.get("source_hint").and_then(|v| v.as_str()) == Some("cross_chip_fill"));
        assert!(created.is_some(), "expected a run_created journal entry with source_hint=cross_chip_fill");
        Ok(())
    })
    .unwrap();
}

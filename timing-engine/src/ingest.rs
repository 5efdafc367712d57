//! Ingest: duplicate detection, admission control, and chip→bib
//! resolution before handing a punch to the Run Assembler.

use crate::assembler;
use timing_core::*;
use timing_storage::{EventData, Repository};

/// `ingest_punch(event, chip_id, control_code, punch_time, source,
/// upstream_id?) → punch_id | error`: the crate's inbound boundary.
///
/// The raw punch is always inserted — even when flagged a duplicate —
/// so the log stays append-only.
#[allow(clippy::too_many_arguments)]
pub fn ingest_punch(
    repo: &impl Repository,
    config: &TimingConfig,
    event_id: EventId,
    chip_id: i64,
    control_code: i64,
    punch_time: Timestamp,
    source: PunchSource,
    upstream_id: Option<i64>,
    observer: &dyn ObserverSink,
) -> TimingResult<PunchId> {
    if repo.get_setting(settings_keys::INGEST_PAUSED).as_deref() == Some("true") {
        tracing::debug!(%event_id, "ingest refused: ingest_paused");
        return Err(AdmissionError::IngestPaused.into());
    }
    if !repo.event_ids().contains(&event_id) {
        return Err(ConfigError::UnknownEvent { event_id }.into());
    }
    repo.with_event(event_id, |data| {
        ingest_locked(data, config, chip_id, control_code, punch_time, source, upstream_id, observer)
    })
}

#[allow(clippy::too_many_arguments)]
fn ingest_locked(
    data: &mut EventData,
    config: &TimingConfig,
    chip_id: i64,
    control_code: i64,
    punch_time: Timestamp,
    source: PunchSource,
    upstream_id: Option<i64>,
    observer: &dyn ObserverSink,
) -> TimingResult<PunchId> {
    if data.event().status != EventStatus::Active {
        return Err(AdmissionError::EventNotActive.into());
    }
    let is_dup = is_duplicate(data, config, chip_id, control_code, punch_time, source);
    let punch = data.insert_punch(chip_id, control_code, punch_time, source, upstream_id, is_dup);
    if !is_dup {
        route_punch(data, config, &punch, observer)?;
    } else {
        tracing::debug!(punch_id = punch.id.raw(), "punch flagged duplicate, not routed");
    }
    Ok(punch.id)
}

/// Chip ids that currently resolve to the same bib as `chip_id`, or just
/// `chip_id` itself if it resolves to no entry yet (dedup falls back to
/// same-chip comparison when the bib is unknown).
fn bib_equivalent_chips(data: &EventData, chip_id: i64) -> Vec<i64> {
    match data.resolve_chip(chip_id) {
        Some(entry) => data.chip_mappings_for_entry(entry.id).iter().map(|m| m.chip_id).collect(),
        None => vec![chip_id],
    }
}

fn is_duplicate(
    data: &EventData,
    config: &TimingConfig,
    chip_id: i64,
    control_code: i64,
    punch_time: Timestamp,
    source: PunchSource,
) -> bool {
    bib_equivalent_chips(data, chip_id).iter().any(|&c| {
        data.punches_within_window(c, control_code, punch_time, config.dedup_window_seconds)
            .iter()
            .any(|existing| source.priority() >= existing.source.priority())
    })
}

/// Resolve the punch's chip and control, then hand it to the Assembler
/// for every stage the control belongs to.
pub(crate) fn route_punch(
    data: &mut EventData,
    config: &TimingConfig,
    punch: &Punch,
    observer: &dyn ObserverSink,
) -> TimingResult<()> {
    let Some(entry) = data.resolve_chip(punch.chip_id).cloned() else {
        tracing::debug!(chip_id = punch.chip_id, "chip not mapped, punch stored raw");
        return Ok(());
    };
    let Some(control) = data.control_by_code(punch.control_code).cloned() else {
        tracing::debug!(control_code = punch.control_code, "control not known, punch stored raw");
        return Ok(());
    };
    let stage_ids: Vec<StageId> = data.stages_using_control(control.id).iter().map(|s| s.id).collect();
    if stage_ids.is_empty() {
        tracing::debug!(control_code = punch.control_code, "control not in any stage, punch stored raw");
        return Ok(());
    }
    for stage_id in stage_ids {
        let stage = data.stage(stage_id).cloned().expect("stage id came from this event's own table");
        let side = stage
            .side_for_control(control.id)
            .expect("stage was selected because it uses this control");
        assembler::handle_punch(data, config, &stage, entry.id, side, punch, observer)?;

        let snapshot = data.active_runs_for(entry.id, stage.id).last().cloned();
        observer.notify(ObserverEvent::Punch {
            bib: Some(entry.bib),
            chip_id: punch.chip_id,
            control_code: punch.control_code,
            time: punch.punch_time,
            source: punch.source,
            stage_run: snapshot,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use timing_storage::{InMemoryRepository, NewEvent};

    fn new_active_event(repo: &InMemoryRepository) -> EventId {
        let event = repo.create_event(NewEvent {
            name: "Test Enduro".into(),
            date: "2026-07-28".into(),
            location: None,
            format: RaceFormat::Enduro,
            stage_order: StageOrder::Fixed,
            time_precision: TimePrecision::Seconds,
            dual_slalom_window_seconds: None,
            upstream_competition_id: None,
        });
        repo.with_event(event.id, |data| {
            data.set_event_status(EventStatus::Active);
            Ok(())
        })
        .unwrap();
        event.id
    }

    #[test]
    fn paused_ingest_is_refused_before_insert() {
        let repo = InMemoryRepository::new();
        let event_id = new_active_event(&repo);
        repo.set_setting(settings_keys::INGEST_PAUSED, "true");
        let result = ingest_punch(
            &repo,
            &TimingConfig::default(),
            event_id,
            1,
            100,
            chrono::Utc::now(),
            PunchSource::Usb,
            None,
            &NullObserverSink,
        );
        assert!(matches!(
            result,
            Err(TimingError::Admission(AdmissionError::IngestPaused))
        ));
    }

    #[test]
    fn unknown_event_is_rejected() {
        let repo = InMemoryRepository::new();
        let result = ingest_punch(
            &repo,
            &TimingConfig::default(),
            EventId::new(999),
            1,
            100,
            chrono::Utc::now(),
            PunchSource::Usb,
            None,
            &NullObserverSink,
        );
        assert!(matches!(result, Err(TimingError::Config(ConfigError::UnknownEvent { .. }))));
    }

    #[test]
    fn duplicate_punch_is_stored_but_not_routed() {
        let repo = InMemoryRepository::new();
        let event_id = new_active_event(&repo);
        let t0 = chrono::Utc::now();
        ingest_punch(&repo, &TimingConfig::default(), event_id, 1, 100, t0, PunchSource::Roc, None, &NullObserverSink).unwrap();
        ingest_punch(
            &repo,
            &TimingConfig::default(),
            event_id,
            1,
            100,
            t0 + chrono::Duration::seconds(1),
            PunchSource::Roc,
            None,
            &NullObserverSink,
        )
        .unwrap();
        repo.with_event(event_id, |data| {
            assert_eq!(data.punches().len(), 2);
            assert!(data.punches()[1].is_duplicate);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn higher_priority_source_is_never_flagged_duplicate() {
        let repo = InMemoryRepository::new();
        let event_id = new_active_event(&repo);
        let t0 = chrono::Utc::now();
        ingest_punch(&repo, &TimingConfig::default(), event_id, 1, 100, t0, PunchSource::Roc, None, &NullObserverSink).unwrap();
        ingest_punch(
            &repo,
            &TimingConfig::default(),
            event_id,
            1,
            100,
            t0 + chrono::Duration::seconds(1),
            PunchSource::Usb,
            None,
            &NullObserverSink,
        )
        .unwrap();
        repo.with_event(event_id, |data| {
            assert!(!data.punches()[1].is_duplicate);
            Ok(())
        })
        .unwrap();
    }
}

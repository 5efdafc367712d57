//! Sync journal read path: downstream replication readers
//! consume unsynced entries in id order and acknowledge them.

use timing_core::*;
use timing_storage::Repository;

pub fn unsynced(repo: &impl Repository, event_id: EventId) -> TimingResult<Vec<JournalEntry>> {
    repo.with_event(event_id, |data| {
        let mut entries: Vec<JournalEntry> = data.unsynced_journal().into_iter().cloned().collect();
        entries.sort_by_key(|e| e.id.raw());
        Ok(entries)
    })
}

pub fn mark_synced(repo: &impl Repository, event_id: EventId, ids: &[JournalId]) -> TimingResult<()> {
    repo.with_event(event_id, |data| {
        data.mark_journal_synced(ids);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use timing_storage::{InMemoryRepository, NewEvent};

    #[test]
    fn unsynced_entries_are_returned_in_id_order_and_can_be_acknowledged() {
        let repo = InMemoryRepository::new();
        let event = repo.create_event(NewEvent {
            name: "Test".into(),
            date: "2026-07-28".into(),
            location: None,
            format: RaceFormat::Enduro,
            stage_order: StageOrder::Fixed,
            time_precision: TimePrecision::Seconds,
            dual_slalom_window_seconds: None,
            upstream_competition_id: None,
        });
        repo.with_event(event.id, |data| {
            data.append_journal(JournalKind::RunCreated, serde_json::json!({}));
            data.append_journal(JournalKind::RunCreated, serde_json::json!({}));
            Ok(())
        })
        .unwrap();

        let entries = unsynced(&repo, event.id).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].id.raw() < entries[1].id.raw());

        mark_synced(&repo, event.id, &[entries[0].id]).unwrap();
        let remaining = unsynced(&repo, event.id).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, entries[1].id);
    }
}

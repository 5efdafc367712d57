//! The `Repository` seam and its in-memory reference implementation.
//! Mutations for a given event are serialized by a per-event critical
//! section; concurrent ingest on distinct events is permitted.

use crate::EventData;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, RwLock};
use timing_core::*;

/// Fields needed to create an `Event`; the id and initial `Setup` status
/// are assigned by the repository, not the caller.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub name: String,
    pub date: String,
    pub location: Option<String>,
    pub format: RaceFormat,
    pub stage_order: StageOrder,
    pub time_precision: TimePrecision,
    pub dual_slalom_window_seconds: Option<f64>,
    pub upstream_competition_id: Option<String>,
}

/// Storage abstraction the engine runs against. Not object-safe by
/// design — `with_event` is generic over its closure's return type, so
/// callers hold a concrete `R: Repository` rather than a `dyn` trait
/// object. A durable backend would implement this trait the same way.
pub trait Repository: Send + Sync {
    /// Create a new event in `Setup` status and assign it an id.
    fn create_event(&self, new: NewEvent) -> Event;

    /// Run `f` against the exclusively-locked per-event table set. This
    /// is the only way to read or write event-scoped data; every
    /// pipeline stage (ingest, assembly, aggregation) runs as one call
    /// here so intermediate state is never visible across threads.
    fn with_event<R>(&self, event_id: EventId, f: impl FnOnce(&mut EventData) -> TimingResult<R>) -> TimingResult<R>;

    fn event_ids(&self) -> Vec<EventId>;

    fn event_snapshot(&self, event_id: EventId) -> TimingResult<Event> {
        self.with_event(event_id, |data| Ok(data.event().clone()))
    }

    /// Process-wide settings (`ingest_paused`, `standings_frozen`,
    /// `usb_connected`) — not scoped to any one event.
    fn get_setting(&self, key: &str) -> Option<String>;
    fn set_setting(&self, key: &str, value: &str);

    fn append_audit_log(&self, entry: NewAuditLogEntry) -> AuditLogEntry;
    fn audit_log(&self) -> Vec<AuditLogEntry>;
}

/// Fields needed to append an audit log row; id and timestamp are
/// assigned by the repository.
#[derive(Debug, Clone)]
pub struct NewAuditLogEntry {
    pub event_id: Option<EventId>,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub details: Option<String>,
    pub before: Option<String>,
    pub after: Option<String>,
    pub source: String,
}

/// Reference `Repository` implementation: everything lives in process
/// memory behind a per-event `Mutex`, matching `core/database.py`'s
/// single-writer SQLite model without the durability.
#[derive(Default)]
pub struct InMemoryRepository {
    events: RwLock<HashMap<EventId, Mutex<EventData>>>,
    next_event_id: AtomicI64,
    next_audit_id: AtomicI64,
    settings: RwLock<HashMap<String, String>>,
    audit_log: Mutex<Vec<AuditLogEntry>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Repository for InMemoryRepository {
    fn create_event(&self, new: NewEvent) -> Event {
        let id = EventId::new(self.next_event_id.fetch_add(1, Ordering::SeqCst) + 1);
        let event = Event {
            id,
            name: new.name,
            date: new.date,
            location: new.location,
            format: new.format,
            stage_order: new.stage_order,
            time_precision: new.time_precision,
            status: EventStatus::Setup,
            dual_slalom_window_seconds: new.dual_slalom_window_seconds,
            upstream_competition_id: new.upstream_competition_id,
        };
        self.events
            .write()
            .expect("events map lock poisoned")
            .insert(id, Mutex::new(EventData::new(event.clone())));
        event
    }

    fn with_event<R>(&self, event_id: EventId, f: impl FnOnce(&mut EventData) -> TimingResult<R>) -> TimingResult<R> {
        let events = self.events.read().map_err(|_| {
            tracing::error!("events map lock poisoned");
            TimingError::from(StorageError::LockPoisoned)
        })?;
        let slot = events.get(&event_id).ok_or(StorageError::NotFound {
            entity: "event",
            id: event_id.raw(),
        })?;
        let mut data = slot.lock().map_err(|_| {
            tracing::error!(%event_id, "per-event lock poisoned");
            StorageError::LockPoisoned
        })?;
        f(&mut data)
    }

    fn event_ids(&self) -> Vec<EventId> {
        self.events
            .read()
            .expect("events map lock poisoned")
            .keys()
            .copied()
            .collect()
    }

    fn get_setting(&self, key: &str) -> Option<String> {
        self.settings.read().expect("settings lock poisoned").get(key).cloned()
    }

    fn set_setting(&self, key: &str, value: &str) {
        self.settings
            .write()
            .expect("settings lock poisoned")
            .insert(key.to_string(), value.to_string());
    }

    fn append_audit_log(&self, entry: NewAuditLogEntry) -> AuditLogEntry {
        let id = AuditLogId::new(self.next_audit_id.fetch_add(1, Ordering::SeqCst) + 1);
        let row = AuditLogEntry {
            id,
            event_id: entry.event_id,
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            details: entry.details,
            before: entry.before,
            after: entry.after,
            source: entry.source,
            created_at: Utc::now(),
        };
        self.audit_log.lock().expect("audit log lock poisoned").push(row.clone());
        row
    }

    fn audit_log(&self) -> Vec<AuditLogEntry> {
        self.audit_log.lock().expect("audit log lock poisoned").clone()
    }
}

//! Error types for timing-core operations, layered by concern:
//! configuration, admission, integrity, upstream, fatal.
//! ("Resolution" outcomes — unmapped chip, control not in any stage —
//! are not errors; callers see `Ok(None)`, matching `core/timing_engine.py`'s
//! silent early-returns.)

use crate::*;
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("{entity}({id}) not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("unique constraint violated on {entity}: {reason}")]
    Conflict { entity: &'static str, reason: String },

    #[error("foreign key violation: {reason}")]
    ForeignKeyViolation { reason: String },

    #[error("transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("repository lock poisoned")]
    LockPoisoned,

    #[error("repository unreachable: {reason}")]
    Unreachable { reason: String },
}

/// Configuration errors (malformed template, unknown event).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown event {event_id}")]
    UnknownEvent { event_id: EventId },

    #[error("required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("dangling reference in template: {reason}")]
    DanglingReference { reason: String },

    #[error("event {event_id} cannot transition {from} -> {to}: {reason}")]
    InvalidTransition {
        event_id: EventId,
        from: &'static str,
        to: &'static str,
        reason: String,
    },
}

/// Admission-control errors.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("ingest is paused for this event")]
    IngestPaused,

    #[error("event is not active")]
    EventNotActive,
}

/// Unexpected invariant violations — these abort the operation and roll
/// back the surrounding transaction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("recomputed elapsed time went negative for stage_run {stage_run_id}")]
    NegativeElapsed { stage_run_id: StageRunId },

    #[error("journal write failed after state mutation: {reason}")]
    JournalWriteFailed { reason: String },

    #[error("attempt number {attempt} already present for ({entry}, {stage})")]
    DuplicateAttempt {
        entry: EntryId,
        stage: StageId,
        attempt: i32,
    },
}

/// Master error type for all timing-core operations.
#[derive(Debug, Clone, Error)]
pub enum TimingError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("admission error: {0}")]
    Admission(#[from] AdmissionError),

    #[error("integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("import error: {0}")]
    Import(String),
}

/// Result alias for timing-core operations.
pub type TimingResult<T> = Result<T, TimingError>;

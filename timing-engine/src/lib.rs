//! timing-engine — Punch Ingest, Run Assembly, Classification
//!
//! The pipeline: `ingest` accepts a raw punch, `assembler` owns the
//! `StageRun` state machine, `aggregator` derives `OverallResult` rows
//! and speaker highlights, `grouper` normalizes dual-slalom mass
//! starts, `recompute` replays the punch log from
//! scratch, and `journal` exposes the sync-queue read path. Every
//! pipeline call runs inside `Repository::with_event`'s per-event
//! critical section (§5); nothing here spawns a thread or awaits I/O.

mod aggregator;
mod assembler;
mod export;
mod grouper;
mod ingest;
mod journal;
mod recompute;

pub use export::ResultExporter;
pub use grouper::group_dual_slalom_starts;
pub use ingest::ingest_punch;
pub use journal::{mark_synced, unsynced};
pub use recompute::{recompute_all, RecomputeDiff, RecomputeDiffKind};

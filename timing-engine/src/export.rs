//! Named interface only — CSV export and the downstream result
//! publisher are out of scope for this crate. A downstream crate
//! implements this trait; nothing here formats a row.

use timing_core::*;

pub trait ResultExporter {
    fn export_standings_csv(&self, event_id: EventId, class_id: ClassId) -> TimingResult<String>;
    fn export_stage_results_csv(&self, event_id: EventId, stage_id: StageId) -> TimingResult<String>;
}

//! timing-import — CSV Importers and Template Apply
//!
//! Peripheral, non-core collaborators: startlist, chip mapping, and
//! punch-file CSV import, plus applying (and exporting) a structural
//! JSON template for an event. CSV *export* and the outbound result
//! publisher are out of scope here — see `timing_engine::ResultExporter`
//! for the named interface a downstream crate would implement.
//!
//! Grounded in `core/timing_engine.py`'s `import_startlist_csv`,
//! `import_chipmapping_csv`, `import_roc_punches`, and `core/templates.py`'s
//! built-in template shapes.

mod chip_mapping;
mod punch_file;
mod startlist;
mod template;

pub use chip_mapping::import_chip_mapping;
pub use punch_file::{import_punch_file, PunchFileReport};
pub use startlist::import_startlist;
pub use template::{apply_template, export_template, EventTemplate, TemplateClass, TemplateControl, TemplateCourse, TemplateStage};

/// Common result shape for a CSV/template import: how many rows were
/// applied, and warnings for anything skipped (e.g. dangling
/// references to a class or course that doesn't exist).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    pub imported: usize,
    pub warnings: Vec<String>,
}

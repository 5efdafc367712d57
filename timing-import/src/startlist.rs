//! Startlist CSV import, grounded in
//! `core/timing_engine.py::import_startlist_csv`.
//!
//! Format: `BIB;FirstName;LastName;Club;Class`, `;`-separated, UTF-8.
//! Classes are created on demand; a default "Huvudbana" course is
//! materialized if the event has none and is linked to every stage.

use crate::ImportReport;
use std::collections::HashMap;
use timing_core::*;
use timing_storage::{EventData, Repository};

/// Import a startlist CSV for `event_id`. Idempotent on identical input:
/// re-importing the same file upserts existing entries by bib rather
/// than duplicating them.
pub fn import_startlist(repo: &impl Repository, event_id: EventId, csv_text: &str) -> TimingResult<ImportReport> {
    repo.with_event(event_id, |data| Ok(import_startlist_locked(data, csv_text)))
}

fn import_startlist_locked(data: &mut EventData, csv_text: &str) -> ImportReport {
    let mut warnings = Vec::new();
    let mut imported = 0;
    let default_course_id = data.ensure_default_course();
    let mut class_cache: HashMap<String, ClassId> = data.classes().iter().map(|c| (c.name.clone(), c.id)).collect();

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    for (line_no, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warnings.push(format!("line {}: {e}", line_no + 1));
                continue;
            }
        };
        if record.len() < 5 {
            continue;
        }
        let bib_field = record[0].trim();
        if bib_field.eq_ignore_ascii_case("BIB") {
            continue;
        }
        let Ok(bib) = bib_field.parse::<i64>() else {
            warnings.push(format!("line {}: invalid bib '{bib_field}'", line_no + 1));
            continue;
        };

        let first_name = record[1].trim().to_string();
        let last_name = record[2].trim().to_string();
        let club = non_empty(record[3].trim());
        let class_name = record[4].trim().to_string();

        let class_id = *class_cache
            .entry(class_name.clone())
            .or_insert_with(|| data.insert_class(class_name.clone(), default_course_id, None).id);

        match data.entry_by_bib(bib).map(|e| e.id) {
            Some(existing_id) => data.update_entry_fields(existing_id, first_name, last_name, club, class_id),
            None => {
                data.insert_entry(bib, first_name, last_name, club, class_id);
            }
        }
        imported += 1;
    }

    ImportReport { imported, warnings }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

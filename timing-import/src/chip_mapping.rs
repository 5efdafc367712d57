//! Chip mapping CSV import, grounded in
//! `core/timing_engine.py::import_chipmapping_csv`.
//!
//! Format: `BIB;CHIP_PRIMARY;CHIP_SECONDARY` (secondary optional),
//! `;`-separated. Upserts `ChipMapping` rows with `is_primary` set to 1
//! for the first chip and 0 for the second.

use crate::ImportReport;
use timing_core::*;
use timing_storage::{EventData, Repository};

pub fn import_chip_mapping(repo: &impl Repository, event_id: EventId, csv_text: &str) -> TimingResult<ImportReport> {
    repo.with_event(event_id, |data| Ok(import_chip_mapping_locked(data, csv_text)))
}

fn import_chip_mapping_locked(data: &mut EventData, csv_text: &str) -> ImportReport {
    let mut warnings = Vec::new();
    let mut imported = 0;

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
        if record.len() < 2 {
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
        let Some(entry_id) = data.entry_by_bib(bib).map(|e| e.id) else {
            warnings.push(format!("line {}: no entry for bib {bib}", line_no + 1));
            continue;
        };

        let primary = record[1].trim();
        if !primary.is_empty() {
            match primary.parse::<i64>() {
                Ok(chip_id) => {
                    data.upsert_chip_mapping(entry_id, chip_id, true);
                    imported += 1;
                }
                Err(_) => warnings.push(format!("line {}: invalid primary chip '{primary}'", line_no + 1)),
            }
        }

        if let Some(secondary) = record.get(2).map(str::trim).filter(|s| !s.is_empty()) {
            match secondary.parse::<i64>() {
                Ok(chip_id) => {
                    data.upsert_chip_mapping(entry_id, chip_id, false);
                    imported += 1;
                }
                Err(_) => warnings.push(format!("line {}: invalid secondary chip '{secondary}'", line_no + 1)),
            }
        }
    }

    ImportReport { imported, warnings }
}

//! Punch file CSV import, grounded in
//! `core/timing_engine.py::import_roc_punches`.
//!
//! Format: `UPSTREAM_ID;CONTROL_CODE;CHIP_ID;YYYY-MM-DD HH:MM:SS`,
//! `;`-separated; lines beginning with `#` are comments. Lines whose
//! `UPSTREAM_ID` already appears among this event's punches are skipped
//! before reaching `Ingest`, in addition to `Ingest`'s own duplicate
//! window — re-running an import of the same file is a
//! no-op.

use timing_core::*;
use timing_storage::Repository;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PunchFileReport {
    pub total: usize,
    pub imported: usize,
    pub warnings: Vec<String>,
}

#[allow(clippy::too_many_arguments)]
pub fn import_punch_file(
    repo: &impl Repository,
    config: &TimingConfig,
    event_id: EventId,
    csv_text: &str,
    source: PunchSource,
    observer: &dyn ObserverSink,
) -> TimingResult<PunchFileReport> {
    let mut warnings = Vec::new();
    let mut total = 0;
    let mut imported = 0;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(csv_text.as_bytes());

    for result in reader.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warnings.push(format!("{e}"));
                continue;
            }
        };
        let line_no = record.position().map(|p| p.line()).unwrap_or(0);
        if record.len() < 4 {
            warnings.push(format!("line {line_no}: expected 4 fields, got {}", record.len()));
            continue;
        }

        let parsed = (|| -> Option<(i64, i64, i64, Timestamp)> {
            let upstream_id = record[0].trim().parse().ok()?;
            let control_code = record[1].trim().parse().ok()?;
            let chip_id = record[2].trim().parse().ok()?;
            let punch_time = parse_timestamp(record[3].trim()).ok()?;
            Some((upstream_id, control_code, chip_id, punch_time))
        })();

        let Some((upstream_id, control_code, chip_id, punch_time)) = parsed else {
            warnings.push(format!("line {line_no}: could not parse '{}'", record.iter().collect::<Vec<_>>().join(";")));
            continue;
        };
        total += 1;

        let already_seen = repo.with_event(event_id, |data| {
            Ok(data.punches().iter().any(|p| p.upstream_id == Some(upstream_id)))
        })?;
        if already_seen {
            continue;
        }

        match timing_engine::ingest_punch(repo, config, event_id, chip_id, control_code, punch_time, source, Some(upstream_id), observer) {
            Ok(_) => imported += 1,
            Err(e) => warnings.push(format!("line {line_no}: {e}")),
        }
    }

    Ok(PunchFileReport { total, imported, warnings })
}

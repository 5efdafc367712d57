//! Timestamp parsing and elapsed/behind formatting at three precisions,
//! grounded in `core/timing_engine.py`'s `format_elapsed`,
//! `format_time_behind`, and `parse_timestamp`.

use crate::TimePrecision;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Canonical wire format for punch timestamps: `YYYY-MM-DD HH:MM:SS` UTC.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse `"YYYY-MM-DD HH:MM:SS"` as a UTC timestamp.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let naive = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Render a UTC timestamp in the canonical wire format.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Format elapsed seconds as `MM:SS`, `MM:SS.t`, or `MM:SS.cc` depending on
/// precision. `None` renders as an empty string.
pub fn format_elapsed(seconds: Option<f64>, precision: TimePrecision) -> String {
    let Some(seconds) = seconds else {
        return String::new();
    };
    let neg = seconds < 0.0;
    let s = seconds.abs();
    let minutes = (s / 60.0) as i64;
    let remainder = s - (minutes as f64) * 60.0;

    let text = match precision {
        TimePrecision::Hundredths => format!("{minutes}:{remainder:05.2}"),
        TimePrecision::Tenths => format!("{minutes}:{remainder:04.1}"),
        TimePrecision::Seconds => format!("{minutes}:{:02}", remainder as i64),
    };

    if neg {
        format!("-{text}")
    } else {
        text
    }
}

/// Format a time-behind-leader value: empty for `None`/`0`, else a
/// `+`-prefixed elapsed string.
pub fn format_time_behind(seconds: Option<f64>, precision: TimePrecision) -> String {
    match seconds {
        None => String::new(),
        Some(s) if s == 0.0 => String::new(),
        Some(s) => format!("+{}", format_elapsed(Some(s), precision)),
    }
}

//! Timestamp helpers.
//!
//! All database columns hold RFC-3339 UTC strings with millisecond precision
//! ([`to_rfc3339_millis`]), so lexical order equals chronological order and
//! `ORDER BY played_at DESC` does the right thing in SQLite.
//!
//! PGN headers carry dates as `YYYY.MM.DD` with an optional `HH:MM:SS` in a
//! separate tag; [`from_pgn_date`] turns those into UTC instants.

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

/// RFC-3339 with offset -> UTC.
///
/// Example:
/// - "2024-03-10T09:30:00-05:00" -> "2024-03-10T14:30:00Z"
pub fn parse_ts_to_utc(s: &str) -> anyhow::Result<DateTime<Utc>> {
    let dt = DateTime::parse_from_rfc3339(s).with_context(|| format!("bad rfc3339: {s}"))?;
    Ok(dt.with_timezone(&Utc))
}

/// Like [`parse_ts_to_utc`] for nullable columns.
pub fn parse_opt(s: Option<&str>) -> anyhow::Result<Option<DateTime<Utc>>> {
    s.map(parse_ts_to_utc).transpose()
}

/// Canonical storage format: `2024-03-10T14:30:00.000Z`.
pub fn to_rfc3339_millis(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// PGN `UTCDate`/`Date` (+ optional `UTCTime`) -> UTC.
///
/// Unknown components (`????.??.??`) yield `None`; a missing or unknown time
/// means midnight.
pub fn from_pgn_date(date: &str, time: Option<&str>) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y.%m.%d").ok()?;
    let time = time
        .and_then(|t| NaiveTime::parse_from_str(t.trim(), "%H:%M:%S").ok())
        .unwrap_or(NaiveTime::MIN);
    Some(date.and_time(time).and_utc())
}

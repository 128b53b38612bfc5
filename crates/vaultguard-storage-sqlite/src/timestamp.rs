//! Timestamps in SQLite `datetime()` text form (UTC)

use chrono::{DateTime, NaiveDateTime, Utc};

const SQLITE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format as `YYYY-MM-DD HH:MM:SS`
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(SQLITE_FORMAT).to_string()
}

/// Parse the forms SQLite and older installs produce. `None` if unrecognised.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc)))
}

//! Timestamps are stored as RFC 3339 UTC strings with millisecond precision,
//! which keeps lexical and chronological order identical.

use chrono::{DateTime, SecondsFormat, Utc};

pub fn format(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now() -> String {
    format(Utc::now())
}

/// Parse a stored timestamp. Accepts the RFC 3339 form written by this crate
/// and SQLite's `datetime('now')` form.
pub fn parse(s: &str) -> Option<DateTime<Utc>> {
    s.parse::<DateTime<Utc>>().ok().or_else(|| {
        chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|ndt| ndt.and_utc())
    })
}

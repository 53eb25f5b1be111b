//! Timestamp helpers.
//!
//! Replicated rows carry ISO-8601 UTC strings. The engine writes them with
//! millisecond precision and a `Z` suffix, and compares `updated_at` values
//! coming from business routers that may use other RFC 3339 offsets.

use chrono::{DateTime, SecondsFormat, Utc};
use std::cmp::Ordering;

/// Returns the current UTC time as an RFC 3339 string, e.g.
/// `2024-01-01T00:00:00.000Z`.
#[must_use]
pub fn now_utc() -> String {
    format_utc(Utc::now())
}

/// Formats a UTC instant the way the engine stores it.
#[must_use]
pub fn format_utc(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses an RFC 3339 timestamp into UTC.
pub fn parse_utc(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Orders two optional `updated_at` values.
///
/// A missing value orders before any present one. When both parse as RFC 3339
/// the instants are compared, otherwise the raw strings are.
#[must_use]
pub fn compare_updated_at(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (parse_utc(a), parse_utc(b)) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => a.cmp(b),
        },
    }
}

//! Time handling utilities for model run collections.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimeParseError {
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),
}

/// Parse an ISO 8601 timestamp.
///
/// Accepts a full RFC 3339 string, a datetime without timezone (assumed
/// UTC), or a bare date (midnight UTC).
pub fn parse_iso8601(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(&format!("{}T00:00:00", s), "%Y-%m-%dT%H:%M:%S")
    {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(TimeParseError::InvalidFormat(s.to_string()))
}

/// Format a timestamp the way it is stored in inventory files.
pub fn format_iso8601(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Hours from `origin` to `date`, as a float (sub-hour runs keep minutes).
pub fn offset_hours(origin: DateTime<Utc>, date: DateTime<Utc>) -> f64 {
    let diff = date.signed_duration_since(origin);
    diff.num_seconds() as f64 / 3600.0
}

/// Add a (possibly fractional) number of hours to a timestamp.
pub fn add_hours(origin: DateTime<Utc>, hours: f64) -> DateTime<Utc> {
    let secs = (hours * 3600.0).round() as i64;
    origin + Duration::seconds(secs)
}

/// Hour of day in UTC, with minutes as a fraction (e.g. 06:30 -> 6.5).
///
/// Used to match a run against a per-run-hour sequence definition.
pub fn hour_of_day(dt: DateTime<Utc>) -> f64 {
    use chrono::Timelike;
    dt.hour() as f64 + dt.minute() as f64 / 60.0
}

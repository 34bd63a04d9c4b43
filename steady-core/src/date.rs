//! Date validation and comparison helpers.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Timelike, Utc};

use crate::error::{ReconcileError, Result};
use crate::payload::Attributes;

/// The only date format accepted in declarative input, e.g. `2022-08-02T15:00+0200`.
pub const INPUT_FORMAT: &str = "%Y-%m-%dT%H:%M%z";

/// Format of timestamps returned by Better Uptime, e.g. `2022-08-02T13:00:00.000Z`.
const REMOTE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// Parse an input date, normalised to UTC.
pub fn parse_input(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(text, INPUT_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a timestamp read from the API.
pub fn parse_remote(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, REMOTE_FORMAT)
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

/// Fail on the first of `fields` whose value is not a valid input date.
pub fn validate_fields(attributes: &Attributes, fields: &[&str]) -> Result<()> {
    for field in fields {
        if let Some(value) = attributes.get(*field) {
            let valid = value.as_str().and_then(parse_input).is_some();
            if !valid {
                return Err(ReconcileError::InvalidInput(format!(
                    "Wrong date format for {field}"
                )));
            }
        }
    }
    Ok(())
}

/// Equal in UTC down to the minute; seconds and below are ignored.
pub fn same_minute(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    let truncate = |dt: DateTime<Utc>| dt.with_second(0).and_then(|d| d.with_nanosecond(0));
    truncate(a) == truncate(b)
}

/// Current time as RFC 3339 with a `Z` suffix.
pub fn now_utc() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

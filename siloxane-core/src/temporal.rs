//! ISO-8601 formatting and parsing of date/time leaves.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat};
use serde::{Deserialize, Serialize};

use crate::descriptor::ScalarKind;
use crate::value::Value;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const LOCAL_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Native date/time kinds a field can be declared as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemporalKind {
    Date,
    Time,
    DateTime,
}

impl TemporalKind {
    pub fn from_scalar(kind: ScalarKind) -> Option<Self> {
        match kind {
            ScalarKind::Date => Some(TemporalKind::Date),
            ScalarKind::Time => Some(TemporalKind::Time),
            ScalarKind::DateTime => Some(TemporalKind::DateTime),
            _ => None,
        }
    }

    pub fn expected_format(&self) -> &'static str {
        match self {
            TemporalKind::Date => "YYYY-MM-DD",
            TemporalKind::Time => "HH:MM:SS[.ffffff]",
            TemporalKind::DateTime => "YYYY-MM-DDTHH:MM:SS[.ffffff][+HH:MM]",
        }
    }
}

/// Formats a date/time leaf as ISO-8601, keeping any offset.
///
/// Returns `None` for non-temporal values.
pub fn format_iso(value: &Value) -> Option<String> {
    match value {
        Value::Date(d) => Some(d.format(DATE_FORMAT).to_string()),
        Value::Time(t) => Some(t.format(TIME_FORMAT).to_string()),
        Value::LocalDateTime(dt) => Some(dt.format(LOCAL_DATETIME_FORMATS[0]).to_string()),
        Value::DateTime(dt) => Some(dt.to_rfc3339_opts(SecondsFormat::AutoSi, false)),
        _ => None,
    }
}

/// Parses ISO-8601 text into whichever date/time leaf it spells.
pub fn parse_iso(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(Value::DateTime(dt));
    }
    if let Some(dt) = parse_local_datetime(text) {
        return Some(Value::LocalDateTime(dt));
    }
    if let Ok(d) = NaiveDate::parse_from_str(text, DATE_FORMAT) {
        return Some(Value::Date(d));
    }
    parse_time(text).map(Value::Time)
}

/// Parses ISO-8601 text as a specific kind.
///
/// A bare date is accepted for `DateTime` and yields midnight.
pub fn parse_as(text: &str, kind: TemporalKind) -> Option<Value> {
    let text = text.trim();
    match kind {
        TemporalKind::Date => NaiveDate::parse_from_str(text, DATE_FORMAT)
            .ok()
            .map(Value::Date),
        TemporalKind::Time => parse_time(text).map(Value::Time),
        TemporalKind::DateTime => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
                return Some(Value::DateTime(dt));
            }
            parse_local_datetime(text)
                .or_else(|| {
                    NaiveDate::parse_from_str(text, DATE_FORMAT)
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
                .map(Value::LocalDateTime)
        }
    }
}

fn parse_local_datetime(text: &str) -> Option<NaiveDateTime> {
    LOCAL_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn format_keeps_offset() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let dt = tz.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(
            format_iso(&Value::DateTime(dt)).as_deref(),
            Some("2024-01-15T10:30:00+02:00")
        );

        let utc = FixedOffset::east_opt(0).unwrap();
        let dt = utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(
            format_iso(&Value::DateTime(dt)).as_deref(),
            Some("2024-01-15T10:30:00+00:00")
        );
    }

    #[test]
    fn format_naive_values() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(format_iso(&Value::Date(d)).as_deref(), Some("2024-01-15"));

        let dt = d.and_hms_micro_opt(10, 30, 0, 123456).unwrap();
        assert_eq!(
            format_iso(&Value::LocalDateTime(dt)).as_deref(),
            Some("2024-01-15T10:30:00.123456")
        );

        let t = NaiveTime::from_hms_opt(8, 5, 9).unwrap();
        assert_eq!(format_iso(&Value::Time(t)).as_deref(), Some("08:05:09"));

        assert_eq!(format_iso(&Value::from("2024-01-15")), None);
    }

    #[test]
    fn parse_any_kind() {
        assert!(matches!(parse_iso("2024-01-15"), Some(Value::Date(_))));
        assert!(matches!(parse_iso("2024-01-15T10:30:00"), Some(Value::LocalDateTime(_))));
        assert!(matches!(parse_iso("2024-01-15 10:30:00.5"), Some(Value::LocalDateTime(_))));
        assert!(matches!(parse_iso("2024-01-15T10:30:00Z"), Some(Value::DateTime(_))));
        assert!(matches!(parse_iso("10:30:00"), Some(Value::Time(_))));
        assert_eq!(parse_iso("not a date"), None);
    }

    #[test]
    fn parse_as_specific_kind() {
        let d = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert_eq!(parse_as("2024-02-01", TemporalKind::Date), Some(Value::Date(d)));
        assert_eq!(
            parse_as("2024-02-01", TemporalKind::DateTime),
            Some(Value::LocalDateTime(d.and_hms_opt(0, 0, 0).unwrap()))
        );
        assert_eq!(parse_as("2024-02-01T10:00:00", TemporalKind::Date), None);
        assert_eq!(parse_as("2024-13-01", TemporalKind::Date), None);
    }

    #[test]
    fn roundtrip_through_text() {
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        let original = Value::DateTime(tz.with_ymd_and_hms(2023, 6, 30, 23, 59, 59).unwrap());
        let text = format_iso(&original).unwrap();
        assert_eq!(parse_iso(&text), Some(original));
    }
}

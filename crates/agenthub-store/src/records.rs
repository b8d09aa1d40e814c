//! Row mapping helpers shared by the query modules. Timestamps are stored as
//! fixed-width RFC3339 UTC text (millisecond precision, trailing Z) so SQL
//! string comparison equals chronological order.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::{Error, Result};

pub fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn ts_opt(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(ts)
}

pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Corrupt(format!("bad timestamp {:?}: {}", raw, e)))
}

pub fn parse_ts_opt(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_ts(&s)).transpose()
}

pub fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::Corrupt(format!("bad uuid {:?}: {}", raw, e)))
}

pub fn parse_uuid_opt(raw: Option<String>) -> Result<Option<Uuid>> {
    raw.map(|s| parse_uuid(&s)).transpose()
}

pub fn json_text(value: &Value) -> String {
    value.to_string()
}

pub fn parse_json(raw: &str) -> Result<Value> {
    Ok(serde_json::from_str(raw)?)
}

pub fn parse_string_vec(raw: &str) -> Result<Vec<String>> {
    Ok(serde_json::from_str(raw)?)
}

pub fn parse_uuid_vec(raw: &str) -> Result<Vec<Uuid>> {
    let strings: Vec<String> = serde_json::from_str(raw)?;
    strings.iter().map(|s| parse_uuid(s)).collect()
}

pub fn string_vec_text(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

pub fn uuid_vec_text(values: &[Uuid]) -> String {
    let strings: Vec<String> = values.iter().map(|u| u.to_string()).collect();
    string_vec_text(&strings)
}

/// Parse a closed-set column via the type's FromStr
pub fn parse_enum<T>(raw: &str) -> Result<T>
where
    T: std::str::FromStr<Err = agenthub_types::Error>,
{
    raw.parse()
        .map_err(|e| Error::Corrupt(format!("bad enum value: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_are_fixed_width_and_ordered() {
        let early = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 1).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 2).unwrap();
        let (a, b) = (ts(early), ts(late));
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(parse_ts(&a).unwrap(), early);
    }

    #[test]
    fn uuid_vec_round_trip() {
        let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        let text = uuid_vec_text(&ids);
        assert_eq!(parse_uuid_vec(&text).unwrap(), ids);
    }
}

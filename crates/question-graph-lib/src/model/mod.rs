//! Persisted records (as read from the store) and the derived question type.

pub mod history;
pub mod question;
pub mod summary;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Sentinel timestamp for records whose creation time is unknown or unreadable.
pub fn min_timestamp() -> DateTime<Utc> {
    DateTime::<Utc>::MIN_UTC
}

/// Parse an RFC 3339 timestamp, or an ISO-8601 one without offset (taken as UTC).
pub fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    // Databases commonly store naive datetimes, with either separator.
    raw.parse::<NaiveDateTime>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|t| t.and_utc())
}

/// Serde helpers for stored `created_at` fields: offset or naive strings are
/// accepted, anything unreadable maps to [`min_timestamp`].
pub(crate) mod lenient_timestamp {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Secs(i64),
        Other(serde_json::Value),
    }

    fn resolve(raw: Raw) -> Option<DateTime<Utc>> {
        match raw {
            Raw::Text(s) => Some(parse_timestamp_str(&s).unwrap_or_else(min_timestamp)),
            Raw::Secs(secs) => {
                Some(DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_else(min_timestamp))
            }
            Raw::Other(serde_json::Value::Null) => None,
            Raw::Other(_) => Some(min_timestamp()),
        }
    }

    pub fn required<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        Ok(resolve(Raw::deserialize(d)?).unwrap_or_else(min_timestamp))
    }

    pub fn optional<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        Ok(resolve(Raw::deserialize(d)?))
    }
}

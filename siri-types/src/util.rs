use chrono::{DateTime, Utc};
use crate::errors::*;

/// Parses a SIRI timestamp (`2019-08-11T19:27:14Z`, or any RFC 3339 time).
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ParseError::Timestamp(s.into()))
}

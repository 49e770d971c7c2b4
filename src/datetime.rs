//! Timestamp encoding for stored rows.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC text with nanosecond
//! precision. Equal instants produce equal strings and text ordering matches
//! chronological ordering, so range predicates can compare columns directly.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{Result, RssfeedError};

/// Encode a timestamp for storage.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Decode a stored timestamp.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RssfeedError::Database(format!("invalid stored timestamp {s:?}: {e}")))
}

/// Decode an optional stored timestamp.
pub fn parse_optional_timestamp(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_timestamp).transpose()
}

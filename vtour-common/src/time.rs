//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp the way it is stored in the database (RFC 3339, UTC)
pub fn to_db_string(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

/// Parse a timestamp stored by [`to_db_string`]
///
/// Falls back to the Unix epoch for unparsable values so a single damaged row
/// does not prevent the rest of the store from loading.
pub fn from_db_string(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

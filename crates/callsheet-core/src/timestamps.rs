use chrono::{DateTime, NaiveDateTime, Utc};

/// Native format used by the legacy social API (`Wed Oct 10 20:19:24 +0000 2018`).
const PROVIDER_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

const SPACE_SEPARATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a post timestamp in any of the accepted textual formats.
///
/// Accepted, in order: RFC 3339 / ISO-8601 (including a `Z` suffix and
/// fractional seconds), `YYYY-MM-DD HH:MM:SS` interpreted as UTC, and the
/// provider's native format. Returns `None` when nothing matches.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, SPACE_SEPARATED_FORMAT) {
        return Some(naive.and_utc());
    }

    DateTime::parse_from_str(raw, PROVIDER_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Normalise an optional creation timestamp to UTC.
///
/// Missing or unparseable values fall back to the current time so that a
/// write is never rejected over a bad timestamp.
#[must_use]
pub fn parse_created_at(raw: Option<&str>) -> DateTime<Utc> {
    match raw.and_then(parse_timestamp) {
        Some(dt) => dt,
        None => {
            if let Some(value) = raw {
                tracing::debug!(value, "unparseable created_at, using current time");
            }
            Utc::now()
        }
    }
}

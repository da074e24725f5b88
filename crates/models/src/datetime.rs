//! Lenient ISO-8601 parsing for publication dates.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};

/// Parse a best-effort ISO-8601 datetime.
///
/// Accepts a trailing `Z` (treated as `+00:00`), explicit offsets, naive
/// datetimes with `T` or space separators, and bare dates. Naive inputs are
/// assumed UTC. Returns `None` for anything else.
pub fn parse_datetime(value: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed);
    }

    let utc = Utc.fix();
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(DateTime::from_naive_utc_and_offset(naive, utc));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        let naive = date.and_hms_opt(0, 0, 0)?;
        return Some(DateTime::from_naive_utc_and_offset(naive, utc));
    }

    None
}

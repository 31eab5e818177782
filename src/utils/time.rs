//! Timestamp formatting for TEXT columns.
//!
//! Every timestamp is stored as RFC 3339 UTC with millisecond precision so
//! that lexical comparison in SQL matches chronological order.

use chrono::{DateTime, Duration, NaiveTime, SecondsFormat, Utc};

/// Format a timestamp for storage.
pub fn db_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time formatted for storage.
pub fn now_timestamp() -> String {
    db_timestamp(Utc::now())
}

/// UTC calendar day used as the key for daily counters.
pub fn utc_day(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d").to_string()
}

/// Start of the UTC day after `dt`.
pub fn next_utc_midnight(dt: DateTime<Utc>) -> DateTime<Utc> {
    let midnight = dt.date_naive().and_time(NaiveTime::MIN).and_utc();
    midnight + Duration::days(1)
}

/// Parse a stored timestamp, defaulting to the Unix epoch on error.
pub fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional stored timestamp.
pub fn parse_timestamp_opt(s: Option<&str>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_round_trip_and_ordering() {
        let a = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let b = a + Duration::milliseconds(1500);
        let (sa, sb) = (db_timestamp(a), db_timestamp(b));
        assert_eq!(sa, "2025-03-01T12:00:00.000Z");
        assert!(sa < sb);
        assert_eq!(parse_timestamp(&sb), b);
    }

    #[test]
    fn test_utc_day_and_next_midnight() {
        let dt = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 30).unwrap();
        assert_eq!(utc_day(dt), "2025-12-31");
        assert_eq!(
            next_utc_midnight(dt),
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_invalid_defaults_to_epoch() {
        assert_eq!(parse_timestamp("garbage"), DateTime::UNIX_EPOCH);
        assert_eq!(parse_timestamp_opt(None), None);
        assert_eq!(parse_timestamp_opt(Some("garbage")), None);
    }
}

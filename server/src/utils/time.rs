//! Timestamp helpers
//!
//! All persisted timestamps are unix epoch milliseconds (UTC).

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

/// Current time in epoch milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Start of the current calendar month (UTC) in epoch milliseconds
pub fn month_start_ms(now: DateTime<Utc>) -> i64 {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|| now.timestamp_millis())
}

/// Start of the UTC day containing the given instant, in epoch milliseconds
pub fn day_start_ms(instant: DateTime<Utc>) -> i64 {
    instant
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive).timestamp_millis())
        .unwrap_or_else(|| instant.timestamp_millis())
}

/// Epoch milliseconds of `days` days before now
pub fn days_ago_ms(days: i64) -> i64 {
    (Utc::now() - Duration::days(days)).timestamp_millis()
}

/// Normalize an SDK-provided timestamp: values below 1e12 are seconds
pub fn normalize_timestamp_ms(raw: i64) -> i64 {
    if raw < 1_000_000_000_000 { raw * 1000 } else { raw }
}

/// Seconds until the next occurrence of `hour:00` UTC
pub fn secs_until_utc_hour(now: DateTime<Utc>, hour: u32) -> u64 {
    let today_at = now
        .date_naive()
        .and_hms_opt(hour, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or(now);

    let next = if today_at > now {
        today_at
    } else {
        today_at + Duration::days(1)
    };

    (next - now).num_seconds().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_start() {
        let now = Utc.with_ymd_and_hms(2024, 3, 17, 15, 42, 9).unwrap();
        let start = month_start_ms(now);
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(start, expected.timestamp_millis());
    }

    #[test]
    fn test_day_start() {
        let now = Utc.with_ymd_and_hms(2024, 3, 17, 15, 42, 9).unwrap();
        let start = day_start_ms(now);
        let expected = Utc.with_ymd_and_hms(2024, 3, 17, 0, 0, 0).unwrap();
        assert_eq!(start, expected.timestamp_millis());
    }

    #[test]
    fn test_normalize_timestamp_seconds() {
        assert_eq!(normalize_timestamp_ms(1_700_000_000), 1_700_000_000_000);
    }

    #[test]
    fn test_normalize_timestamp_millis_passthrough() {
        assert_eq!(normalize_timestamp_ms(1_700_000_000_123), 1_700_000_000_123);
    }

    #[test]
    fn test_secs_until_utc_hour_same_day() {
        let now = Utc.with_ymd_and_hms(2024, 3, 17, 1, 0, 0).unwrap();
        assert_eq!(secs_until_utc_hour(now, 2), 3600);
    }

    #[test]
    fn test_secs_until_utc_hour_wraps_to_next_day() {
        let now = Utc.with_ymd_and_hms(2024, 3, 17, 3, 0, 0).unwrap();
        assert_eq!(secs_until_utc_hour(now, 2), 23 * 3600);
    }
}

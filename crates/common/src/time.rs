use chrono::{DateTime, Duration as ChronoDuration, Local, TimeZone, Utc};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current wall-clock time in seconds since the Unix epoch.
pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// Seconds from `now` until the next local midnight. Never zero, so a key
/// created at exactly midnight still gets a full day.
pub fn seconds_until_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> u64 {
    let tomorrow = now.date_naive() + ChronoDuration::days(1);
    let remaining = tomorrow
        .and_hms_opt(0, 0, 0)
        .map(|midnight| (midnight - now.naive_local()).num_seconds())
        .unwrap_or(86_400);
    remaining.max(1) as u64
}

/// Seconds until the next midnight in the server's local time zone.
pub fn seconds_until_local_midnight() -> u64 {
    seconds_until_midnight(&Local::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn one_hour_before_midnight() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2026, 3, 10, 23, 0, 0).unwrap();
        assert_eq!(seconds_until_midnight(&now), 3600);
    }

    #[test]
    fn exactly_midnight_is_a_full_day() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap();
        assert_eq!(seconds_until_midnight(&now), 86_400);
    }

    #[test]
    fn last_second_of_the_day() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 23, 59, 59).unwrap();
        assert_eq!(seconds_until_midnight(&now), 1);
    }
}

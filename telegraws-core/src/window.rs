use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use telegraws_sdk::ReportWindow;

use crate::config::ConfigError;

const DAILY_SPAN_HOURS: i64 = 24;

/// Classifies an invocation at `now` and computes the window it reports on.
///
/// The invocation is the daily report when the UTC hour of `now` equals
/// `daily_report_hour`; the window then covers the prior 24 hours, otherwise
/// the prior `default_period_hours`. Callers must invoke at most once per
/// hour, or the daily report is produced more than once.
pub fn select_window<Tz: TimeZone>(
    now: &DateTime<Tz>,
    daily_report_hour: i64,
    default_period_hours: i64,
) -> Result<ReportWindow, ConfigError> {
    if !(0..=23).contains(&daily_report_hour) {
        return Err(ConfigError::DailyReportHour(daily_report_hour));
    }
    let period = i32::try_from(default_period_hours)
        .ok()
        .filter(|hours| *hours > 0)
        .ok_or(ConfigError::DefaultPeriod(default_period_hours))?;

    let end = now.with_timezone(&Utc);
    let is_daily = i64::from(end.hour()) == daily_report_hour;
    let span_hours = if is_daily {
        DAILY_SPAN_HOURS
    } else {
        i64::from(period)
    };

    let start = end - Duration::hours(span_hours);
    ReportWindow::new(start, end, is_daily).ok_or(ConfigError::DefaultPeriod(default_period_hours))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use proptest::prelude::*;
    use telegraws_sdk::{DAILY_PERIOD_SECS, HOURLY_PERIOD_SECS};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, hour, minute, 42).unwrap()
    }

    #[test]
    fn daily_hour_selects_full_day() {
        let now = at(8, 5);
        let window = select_window(&now, 8, 1).expect("window");
        assert!(window.is_daily());
        assert_eq!(window.end(), now);
        assert_eq!(window.start(), now - Duration::hours(24));
        assert_eq!(window.period_seconds(), DAILY_PERIOD_SECS);
    }

    #[test]
    fn other_hours_use_default_period() {
        let now = at(9, 0);
        let window = select_window(&now, 8, 3).expect("window");
        assert!(!window.is_daily());
        assert_eq!(window.start(), now - Duration::hours(3));
        assert_eq!(window.period_seconds(), HOURLY_PERIOD_SECS);
    }

    #[test]
    fn local_time_is_converted_to_utc() {
        // 10:30 at UTC+2 is 08:30 UTC.
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let local = offset.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap();
        let window = select_window(&local, 8, 1).expect("window");
        assert!(window.is_daily());
        assert_eq!(window.end(), Utc.with_ymd_and_hms(2024, 3, 15, 8, 30, 0).unwrap());
    }

    #[test]
    fn out_of_range_inputs_are_rejected() {
        let now = at(8, 0);
        assert!(matches!(
            select_window(&now, 24, 1),
            Err(ConfigError::DailyReportHour(24))
        ));
        assert!(matches!(
            select_window(&now, -1, 1),
            Err(ConfigError::DailyReportHour(-1))
        ));
        assert!(matches!(
            select_window(&now, 8, 0),
            Err(ConfigError::DefaultPeriod(0))
        ));
        assert!(matches!(
            select_window(&now, 8, -6),
            Err(ConfigError::DefaultPeriod(-6))
        ));
    }

    proptest! {
        #[test]
        fn matching_hour_is_always_daily(hour in 0u32..24, minute in 0u32..60, period in 1i64..72) {
            let now = at(hour, minute);
            let window = select_window(&now, i64::from(hour), period).unwrap();
            prop_assert!(window.is_daily());
            prop_assert_eq!(window.start(), now - Duration::hours(24));
            prop_assert_eq!(window.end(), now);
        }

        #[test]
        fn other_hours_span_default_period(hour in 0u32..24, offset in 1u32..24, period in 1i64..72) {
            let now = at(hour, 0);
            let daily_hour = i64::from((hour + offset) % 24);
            let window = select_window(&now, daily_hour, period).unwrap();
            prop_assert!(!window.is_daily());
            prop_assert_eq!(window.start(), now - Duration::hours(period));
            prop_assert!(window.start() < window.end());
        }
    }
}

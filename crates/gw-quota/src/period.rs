use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Timelike, Utc};

/// Reset cadence for one quota limit (spec §4.12).
#[derive(Debug, Clone, Copy)]
pub enum QuotaPeriod {
    Hourly,
    Daily,
    /// Resets at the Monday boundary.
    Weekly,
    /// Resets on the 1st of the month.
    Monthly,
    /// Resets at an explicit, caller-supplied timestamp.
    Custom(DateTime<Utc>),
}

impl QuotaPeriod {
    /// Whether `now` has crossed a reset boundary since `last_reset`.
    pub(crate) fn reset_due(&self, last_reset: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            Self::Hourly => now.date_naive() != last_reset.date_naive() || now.hour() != last_reset.hour(),
            Self::Daily => now.date_naive() != last_reset.date_naive(),
            Self::Weekly => now.weekday().num_days_from_monday() == 0 && now.date_naive() != last_reset.date_naive(),
            Self::Monthly => now.year() != last_reset.year() || now.month() != last_reset.month(),
            Self::Custom(reset_at) => now >= *reset_at,
        }
    }

    /// The next instant at which this period resets, relative to `now`.
    pub(crate) fn next_reset(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Hourly => {
                let start_of_hour = now
                    .with_minute(0)
                    .and_then(|d| d.with_second(0))
                    .and_then(|d| d.with_nanosecond(0))
                    .unwrap_or(now);
                start_of_hour + ChronoDuration::hours(1)
            }
            Self::Daily => {
                let start_of_day = now
                    .with_hour(0)
                    .and_then(|d| d.with_minute(0))
                    .and_then(|d| d.with_second(0))
                    .and_then(|d| d.with_nanosecond(0))
                    .unwrap_or(now);
                start_of_day + ChronoDuration::days(1)
            }
            Self::Weekly => {
                let start_of_day = now
                    .with_hour(0)
                    .and_then(|d| d.with_minute(0))
                    .and_then(|d| d.with_second(0))
                    .and_then(|d| d.with_nanosecond(0))
                    .unwrap_or(now);
                let days_until_monday = (7 - now.weekday().num_days_from_monday()) % 7;
                let days_until_monday = if days_until_monday == 0 { 7 } else { days_until_monday };
                start_of_day + ChronoDuration::days(days_until_monday as i64)
            }
            Self::Monthly => {
                let (year, month) = if now.month() == 12 { (now.year() + 1, 1) } else { (now.year(), now.month() + 1) };
                Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single().unwrap_or(now + ChronoDuration::days(30))
            }
            Self::Custom(reset_at) => *reset_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn hourly_resets_on_hour_change() {
        let last = Utc.with_ymd_and_hms(2026, 1, 1, 10, 30, 0).unwrap();
        let same_hour = Utc.with_ymd_and_hms(2026, 1, 1, 10, 59, 0).unwrap();
        let next_hour = Utc.with_ymd_and_hms(2026, 1, 1, 11, 0, 0).unwrap();
        assert!(!QuotaPeriod::Hourly.reset_due(last, same_hour));
        assert!(QuotaPeriod::Hourly.reset_due(last, next_hour));
    }

    #[test]
    fn weekly_resets_on_monday() {
        let last = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap(); // Monday
        let tuesday = Utc.with_ymd_and_hms(2026, 1, 6, 0, 0, 0).unwrap();
        let next_monday = Utc.with_ymd_and_hms(2026, 1, 12, 0, 0, 0).unwrap();
        assert!(!QuotaPeriod::Weekly.reset_due(last, tuesday));
        assert!(QuotaPeriod::Weekly.reset_due(last, next_monday));
    }

    #[test]
    fn monthly_resets_on_first() {
        let last = Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap();
        let still_jan = Utc.with_ymd_and_hms(2026, 1, 31, 0, 0, 0).unwrap();
        let feb = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        assert!(!QuotaPeriod::Monthly.reset_due(last, still_jan));
        assert!(QuotaPeriod::Monthly.reset_due(last, feb));
    }
}

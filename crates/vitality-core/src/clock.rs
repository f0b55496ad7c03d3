//! Time source
//!
//! Expiry, windows and periods are evaluated against a [`Clock`] so tests
//! and the simulator can drive time explicitly. The calendar helpers turn
//! local dates into UTC boundaries for a fixed offset.

use crate::config::WeekStart;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use parking_lot::RwLock;
use std::fmt::Debug;

/// Source of the current instant
pub trait Clock: Send + Sync + Debug {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    /// Create clock frozen at `start`
    #[inline]
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    /// Jump to an instant
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.write() = instant;
    }

    /// Move forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

/// UTC instant at which local `date` begins
#[must_use]
pub fn local_midnight(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let local = date.and_time(NaiveTime::MIN);
    Utc.from_utc_datetime(&(local - Duration::seconds(i64::from(offset.local_minus_utc()))))
}

/// First day of the week containing `date`
#[must_use]
pub fn start_of_week(date: NaiveDate, week_start: WeekStart) -> NaiveDate {
    let today = date.weekday().num_days_from_monday();
    let first = week_start.weekday().num_days_from_monday();
    date - Duration::days(i64::from((today + 7 - first) % 7))
}

/// First day of the month containing `date`
#[must_use]
pub fn start_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// First day of the following month
#[must_use]
pub fn start_of_next_month(date: NaiveDate) -> NaiveDate {
    let first = start_of_month(date);
    first
        .checked_add_months(chrono::Months::new(1))
        .unwrap_or(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_told() {
        let start = DateTime::<Utc>::UNIX_EPOCH;
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::hours(2));
        assert_eq!(clock.now(), start + Duration::hours(2));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn local_midnight_applies_offset() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let east = FixedOffset::east_opt(2 * 3600).unwrap();
        let west = FixedOffset::west_opt(5 * 3600).unwrap();

        assert_eq!(
            local_midnight(date, east),
            Utc.with_ymd_and_hms(2026, 3, 9, 22, 0, 0).unwrap()
        );
        assert_eq!(
            local_midnight(date, west),
            Utc.with_ymd_and_hms(2026, 3, 10, 5, 0, 0).unwrap()
        );
    }

    #[test]
    fn week_and_month_boundaries() {
        // 2026-03-11 is a Wednesday
        let date = NaiveDate::from_ymd_opt(2026, 3, 11).unwrap();
        assert_eq!(
            start_of_week(date, WeekStart::Monday),
            NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()
        );
        assert_eq!(
            start_of_week(date, WeekStart::Sunday),
            NaiveDate::from_ymd_opt(2026, 3, 8).unwrap()
        );
        assert_eq!(start_of_week(NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(), WeekStart::Monday).day(), 9);
        assert_eq!(start_of_month(date), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(
            start_of_next_month(NaiveDate::from_ymd_opt(2026, 12, 31).unwrap()),
            NaiveDate::from_ymd_opt(2027, 1, 1).unwrap()
        );
    }
}

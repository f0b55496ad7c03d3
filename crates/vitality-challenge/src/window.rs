//! Challenge windows
//!
//! Windows are half-open `[start, end)` intervals. Daily and weekly
//! challenges recur on local calendar boundaries, clipped to the template's
//! availability range; a special challenge has exactly one window.
//!
//! Each window is named by its `period`: the local date of the day or week
//! it covers. The period, not the UTC start, identifies a window across
//! changes of the user's offset.

use crate::catalog::Challenge;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use vitality_core::{local_midnight, start_of_week, ChallengeType, WeekStart};

/// A time interval during which an instance accepts progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    /// Inclusive start
    pub start: DateTime<Utc>,
    /// Exclusive end
    pub end: DateTime<Utc>,
    /// Local calendar date naming the day or week covered
    pub period: NaiveDate,
}

impl Window {
    /// Create window named by the UTC date of its start
    #[inline]
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            period: start.date_naive(),
        }
    }

    /// With period
    #[inline]
    #[must_use]
    pub fn with_period(mut self, period: NaiveDate) -> Self {
        self.period = period;
        self
    }

    /// Intersection with `bounds`, keeping this window's period
    #[inline]
    #[must_use]
    pub fn clipped_to(self, bounds: Window) -> Self {
        Self {
            start: self.start.max(bounds.start),
            end: self.end.min(bounds.end),
            period: self.period,
        }
    }

    /// Whether `at` falls inside
    #[inline]
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    /// Whether the window has closed at `now`
    #[inline]
    #[must_use]
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end
    }
}

/// Window of `challenge` containing `at`, or `None` outside availability
///
/// Recurring windows never extend past the template's own range.
#[must_use]
pub fn window_for(
    challenge: &Challenge,
    at: DateTime<Utc>,
    offset: FixedOffset,
    week_start: WeekStart,
) -> Option<Window> {
    let available = Window::new(challenge.window_start, challenge.window_end);
    if !available.contains(at) {
        return None;
    }

    let today = at.with_timezone(&offset).date_naive();
    let window = match challenge.challenge_type {
        ChallengeType::Special => available,
        ChallengeType::Daily => Window::new(
            local_midnight(today, offset),
            local_midnight(today + Duration::days(1), offset),
        )
        .with_period(today),
        ChallengeType::Weekly => {
            let first = start_of_week(today, week_start);
            Window::new(
                local_midnight(first, offset),
                local_midnight(first + Duration::days(7), offset),
            )
            .with_period(first)
        }
    };
    Some(window.clipped_to(available))
}

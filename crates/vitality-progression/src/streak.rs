//! Activity streaks
//!
//! A local calendar day counts when it holds at least one qualifying event.
//! The tracker caches each user's [`StreakState`] together with the set of
//! active days, so:
//! - the same day twice never double counts;
//! - an event dated before `last_credited_day` triggers a full recompute
//!   from the day set instead of an incremental patch;
//! - [`StreakTracker::close_day`] materializes the reset to 0 once a full
//!   day has passed without activity.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use vitality_core::{ActivityEvent, StreakConfig, UserId};

/// Local calendar day of an instant
#[inline]
#[must_use]
pub fn local_day(timestamp: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    timestamp.with_timezone(&offset).date_naive()
}

/// Cached streak view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    /// Owner
    pub user_id: UserId,
    /// Consecutive active days ending at `last_credited_day`; 0 once broken
    pub current_streak: u32,
    /// Longest run ever observed
    pub longest_streak: u32,
    /// Most recent active day
    pub last_credited_day: Option<NaiveDate>,
}

impl StreakState {
    /// State with no activity
    #[inline]
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            current_streak: 0,
            longest_streak: 0,
            last_credited_day: None,
        }
    }

    /// Streak as seen on `day`
    ///
    /// Still alive on the day after the last active day; 0 once a full day
    /// has been missed.
    #[must_use]
    pub fn streak_on(&self, day: NaiveDate) -> u32 {
        match self.last_credited_day {
            Some(last) if day == last || day == last + Duration::days(1) => self.current_streak,
            _ => 0,
        }
    }

    /// Derive from a full set of active days
    #[must_use]
    pub fn from_days(user_id: UserId, days: &BTreeSet<NaiveDate>) -> Self {
        recompute(user_id, days, None)
    }

    /// Rebuild from a user's full event log
    #[must_use]
    pub fn from_events<'a>(
        user_id: UserId,
        events: impl IntoIterator<Item = &'a ActivityEvent>,
        config: &StreakConfig,
        offset: FixedOffset,
    ) -> Self {
        let days: BTreeSet<NaiveDate> = events
            .into_iter()
            .filter(|event| event.user_id == user_id)
            .filter(|event| config.qualifies(&event.kind, event.quantity))
            .map(|event| local_day(event.timestamp, offset))
            .collect();
        recompute(user_id, &days, None)
    }
}

/// Derive the state from a set of active days and the last closed day
fn recompute(
    user_id: UserId,
    days: &BTreeSet<NaiveDate>,
    closed_through: Option<NaiveDate>,
) -> StreakState {
    let mut longest = 0u32;
    let mut run = 0u32;
    let mut previous: Option<NaiveDate> = None;

    for &day in days {
        run = match previous {
            Some(p) if day == p + Duration::days(1) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(day);
    }

    let broken = matches!((previous, closed_through), (Some(last), Some(closed)) if closed > last);

    StreakState {
        user_id,
        current_streak: if broken { 0 } else { run },
        longest_streak: longest,
        last_credited_day: previous,
    }
}

#[derive(Debug)]
struct StreakEntry {
    state: StreakState,
    days: BTreeSet<NaiveDate>,
    closed_through: Option<NaiveDate>,
}

impl StreakEntry {
    fn new(user_id: UserId) -> Self {
        Self {
            state: StreakState::new(user_id),
            days: BTreeSet::new(),
            closed_through: None,
        }
    }

    fn credit(&mut self, day: NaiveDate) {
        if !self.days.insert(day) {
            return;
        }

        let closed_before = self.closed_through.map_or(true, |closed| closed < day);
        match self.state.last_credited_day {
            None => {
                self.state.current_streak = 1;
                self.state.last_credited_day = Some(day);
            }
            Some(last) if day > last && closed_before => {
                self.state.current_streak = if day == last + Duration::days(1) {
                    self.state.current_streak + 1
                } else {
                    1
                };
                self.state.last_credited_day = Some(day);
            }
            Some(last) => {
                tracing::debug!(
                    user = %self.state.user_id,
                    %day,
                    %last,
                    "backdated activity, recomputing streak"
                );
                let before = self.state.current_streak;
                self.state = recompute(self.state.user_id.clone(), &self.days, self.closed_through);
                debug_assert!(self.state.current_streak >= before);
            }
        }
        self.state.longest_streak = self.state.longest_streak.max(self.state.current_streak);
    }

    fn close(&mut self, day: NaiveDate) {
        let Some(last) = self.state.last_credited_day else {
            return;
        };
        if last < day {
            self.closed_through = Some(self.closed_through.map_or(day, |c| c.max(day)));
            self.state.current_streak = 0;
        }
    }
}

/// Per-user streak cache
///
/// Each user's entry is updated under the map's entry lock, so concurrent
/// events for one user serialize.
#[derive(Debug, Default)]
pub struct StreakTracker {
    entries: DashMap<UserId, StreakEntry>,
}

impl StreakTracker {
    /// Create empty tracker
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit a qualifying event on local `day`
    pub fn record(&self, user_id: &UserId, day: NaiveDate) -> StreakState {
        let mut entry = self
            .entries
            .entry(user_id.clone())
            .or_insert_with(|| StreakEntry::new(user_id.clone()));
        entry.credit(day);
        entry.state.clone()
    }

    /// Credit a qualifying event at `timestamp`, in the user's local day
    pub fn record_at(
        &self,
        user_id: &UserId,
        timestamp: DateTime<Utc>,
        offset: FixedOffset,
    ) -> StreakState {
        self.record(user_id, local_day(timestamp, offset))
    }

    /// Mark local `day` as over; breaks the streak if it held no activity
    pub fn close_day(&self, user_id: &UserId, day: NaiveDate) -> Option<StreakState> {
        let mut entry = self.entries.get_mut(user_id)?;
        entry.close(day);
        Some(entry.state.clone())
    }

    /// Cached state
    #[must_use]
    pub fn state(&self, user_id: &UserId) -> Option<StreakState> {
        self.entries.get(user_id).map(|entry| entry.state.clone())
    }

    /// Streak as seen on `day`; 0 for unknown users
    #[must_use]
    pub fn streak_on(&self, user_id: &UserId, day: NaiveDate) -> u32 {
        self.entries
            .get(user_id)
            .map_or(0, |entry| entry.state.streak_on(day))
    }

    /// Replace a user's cache with a rebuild from the full event log
    pub fn rebuild<'a>(
        &self,
        user_id: &UserId,
        events: impl IntoIterator<Item = &'a ActivityEvent>,
        config: &StreakConfig,
        offset: FixedOffset,
    ) -> StreakState {
        let days: BTreeSet<NaiveDate> = events
            .into_iter()
            .filter(|event| &event.user_id == user_id)
            .filter(|event| config.qualifies(&event.kind, event.quantity))
            .map(|event| local_day(event.timestamp, offset))
            .collect();

        let mut entry = self
            .entries
            .entry(user_id.clone())
            .or_insert_with(|| StreakEntry::new(user_id.clone()));
        entry.state = recompute(user_id.clone(), &days, entry.closed_through);
        entry.days = days;
        entry.state.clone()
    }

    /// Users with cached state
    #[must_use]
    pub fn users(&self) -> Vec<UserId> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}

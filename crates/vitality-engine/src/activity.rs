//! Activity intake
//!
//! Events are immutable and append-only. The log is the source the streak
//! cache can always be rebuilt from.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use vitality_challenge::{ChallengeStatus, ProgressUpdate};
use vitality_core::{ActivityEvent, ChallengeId, InstanceId, UserId};
use vitality_progression::StreakState;

/// Append-only per-user activity log
#[derive(Debug, Default)]
pub struct ActivityLog {
    events: DashMap<UserId, Vec<ActivityEvent>>,
    total: AtomicU64,
}

impl ActivityLog {
    /// Create empty log
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event
    pub fn append(&self, event: ActivityEvent) {
        self.events
            .entry(event.user_id.clone())
            .or_default()
            .push(event);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// A user's events in arrival order
    #[must_use]
    pub fn for_user(&self, user_id: &UserId) -> Vec<ActivityEvent> {
        self.events
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Total events logged
    #[inline]
    #[must_use]
    pub fn len(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Whether nothing was logged
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A matching instance the event could not advance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedInstance {
    /// Instance
    pub instance_id: InstanceId,
    /// Challenge
    pub challenge_id: ChallengeId,
    /// Status that refused the progress, `Locked` or `Expired`
    pub status: ChallengeStatus,
}

/// What one activity event changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityOutcome {
    /// The logged event
    pub event: ActivityEvent,
    /// Streak after the event; `None` if the activity does not qualify
    pub streak: Option<StreakState>,
    /// Progress applied to matching challenge instances
    pub progress: Vec<ProgressUpdate>,
    /// Instances that could not be locked in time; retry with
    /// `record_progress`
    pub deferred: Vec<InstanceId>,
    /// Instances whose window is not open at the engine clock, such as a
    /// future-dated event or a window that already closed
    pub skipped: Vec<SkippedInstance>,
}

impl ActivityOutcome {
    /// Instances this event completed
    pub fn completed(&self) -> impl Iterator<Item = &ProgressUpdate> {
        self.progress.iter().filter(|update| update.newly_completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use vitality_core::ActivityKind;

    #[test]
    fn append_keeps_order_per_user() {
        let log = ActivityLog::new();
        let alice = UserId::from("alice");
        for quantity in [1, 2, 3] {
            log.append(ActivityEvent::new(
                alice.clone(),
                ActivityKind::Steps,
                quantity,
                DateTime::<Utc>::UNIX_EPOCH,
            ));
        }
        log.append(ActivityEvent::new(
            UserId::from("bob"),
            ActivityKind::WaterGlasses,
            1,
            DateTime::<Utc>::UNIX_EPOCH,
        ));

        let quantities: Vec<_> = log.for_user(&alice).iter().map(|e| e.quantity).collect();
        assert_eq!(quantities, vec![1, 2, 3]);
        assert_eq!(log.len(), 4);
        assert!(log.for_user(&UserId::from("carol")).is_empty());
    }
}

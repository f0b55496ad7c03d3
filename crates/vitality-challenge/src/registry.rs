//! Live challenge instances
//!
//! Instances are keyed uniquely by `(user, challenge, period)`, where the
//! period is the local date naming the window. The
//! key map's entry API makes creation atomic, so concurrent creators for the
//! same window observe one instance. Each instance sits behind its own
//! mutex, acquired with a bounded wait; contention past the timeout is a
//! retryable `Conflict`.
//!
//! Every locked access first applies time-driven transitions, so expiry is
//! observed by any read as well as by [`InstanceRegistry::sweep`].

use crate::catalog::Challenge;
use crate::instance::ChallengeInstance;
use crate::lifecycle::ChallengeStatus;
use crate::window::Window;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use vitality_core::{ChallengeId, EntityKind, InstanceId, QuestError, Result, UserId};

/// Uniqueness key of an instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceKey {
    /// Owner
    pub user_id: UserId,
    /// Template
    pub challenge_id: ChallengeId,
    /// Local date naming the window
    pub period: NaiveDate,
}

/// Registry of live and archived instances
#[derive(Debug)]
pub struct InstanceRegistry {
    by_key: DashMap<InstanceKey, InstanceId>,
    instances: DashMap<InstanceId, Arc<Mutex<ChallengeInstance>>>,
    by_user: DashMap<UserId, Vec<InstanceId>>,
    claimed: DashSet<(UserId, ChallengeId)>,
    archived: DashSet<InstanceId>,
    history: DashMap<UserId, Vec<ChallengeInstance>>,
    lock_timeout: Duration,
    claim_grace: chrono::Duration,
}

impl InstanceRegistry {
    /// Create registry
    #[must_use]
    pub fn new(lock_timeout: Duration, claim_grace: chrono::Duration) -> Self {
        Self {
            by_key: DashMap::new(),
            instances: DashMap::new(),
            by_user: DashMap::new(),
            claimed: DashSet::new(),
            archived: DashSet::new(),
            history: DashMap::new(),
            lock_timeout,
            claim_grace,
        }
    }

    /// Instance for `(user, challenge, window)`, created if absent
    ///
    /// Returns the id and whether this call created it.
    pub fn ensure(
        &self,
        user_id: &UserId,
        challenge: &Challenge,
        window: Window,
        now: DateTime<Utc>,
    ) -> (InstanceId, bool) {
        let key = InstanceKey {
            user_id: user_id.clone(),
            challenge_id: challenge.id.clone(),
            period: window.period,
        };

        match self.by_key.entry(key) {
            Entry::Occupied(existing) => (*existing.get(), false),
            Entry::Vacant(slot) => {
                let prerequisite_met = challenge
                    .prerequisite
                    .as_ref()
                    .map_or(true, |prerequisite| self.has_claimed(user_id, prerequisite));
                let mut instance =
                    ChallengeInstance::new(user_id.clone(), challenge, window, prerequisite_met);
                instance.observe(now, self.claim_grace);

                let id = instance.id;
                tracing::debug!(
                    instance = %id,
                    user = %user_id,
                    challenge = %challenge.id,
                    period = %window.period,
                    window_start = %window.start,
                    status = %instance.status,
                    "challenge instance created"
                );

                self.instances.insert(id, Arc::new(Mutex::new(instance)));
                self.by_user.entry(user_id.clone()).or_default().push(id);
                slot.insert(id);
                (id, true)
            }
        }
    }

    /// Id of the instance for a key, live or archived
    #[must_use]
    pub fn find(&self, key: &InstanceKey) -> Option<InstanceId> {
        self.by_key.get(key).map(|entry| *entry.value())
    }

    /// Run `f` on a user's instance under its lock
    ///
    /// # Errors
    /// - `QuestError::NotFound` if the instance is unknown or belongs to
    ///   another user
    /// - `QuestError::InvalidState` if the instance has been archived
    /// - `QuestError::Conflict` on lock timeout
    /// - whatever `f` returns
    pub fn with_instance<T>(
        &self,
        user_id: &UserId,
        id: InstanceId,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut ChallengeInstance) -> Result<T>,
    ) -> Result<T> {
        let Some(cell) = self.instances.get(&id).map(|entry| Arc::clone(entry.value())) else {
            if self.archived.contains(&id) {
                return Err(QuestError::invalid_state("modify", "archived"));
            }
            return Err(QuestError::not_found(EntityKind::Instance, id));
        };

        let mut instance = cell
            .try_lock_for(self.lock_timeout)
            .ok_or_else(|| self.timeout(id))?;

        if &instance.user_id != user_id {
            return Err(QuestError::not_found(EntityKind::Instance, id));
        }

        self.refresh(&mut instance, now);
        f(&mut instance)
    }

    /// Copy of a user's instance as of `now`
    ///
    /// # Errors
    /// Same as [`InstanceRegistry::with_instance`]
    pub fn snapshot(
        &self,
        user_id: &UserId,
        id: InstanceId,
        now: DateTime<Utc>,
    ) -> Result<ChallengeInstance> {
        self.with_instance(user_id, id, now, |instance| Ok(instance.clone()))
    }

    /// A user's live instances as of `now`, ordered by window then challenge
    ///
    /// # Errors
    /// `QuestError::Conflict` on lock timeout
    pub fn for_user(&self, user_id: &UserId, now: DateTime<Utc>) -> Result<Vec<ChallengeInstance>> {
        let mut found = Vec::new();
        for id in self.user_ids(user_id) {
            match self.snapshot(user_id, id, now) {
                Ok(instance) => found.push(instance),
                // archived concurrently
                Err(QuestError::NotFound { .. } | QuestError::InvalidState { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        found.sort_by(|a, b| {
            (a.window_start, &a.challenge_id).cmp(&(b.window_start, &b.challenge_id))
        });
        Ok(found)
    }

    /// A user's archived instances, ordered by window then challenge
    #[must_use]
    pub fn history(&self, user_id: &UserId) -> Vec<ChallengeInstance> {
        let mut found = self
            .history
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        found.sort_by(|a, b| {
            (a.window_start, &a.challenge_id).cmp(&(b.window_start, &b.challenge_id))
        });
        found
    }

    /// Whether the user has claimed `challenge_id` in any window
    #[must_use]
    pub fn has_claimed(&self, user_id: &UserId, challenge_id: &ChallengeId) -> bool {
        self.claimed
            .contains(&(user_id.clone(), challenge_id.clone()))
    }

    /// Note a claim and unlock the user's instances gated on it
    ///
    /// Returns the instances that became `Active`. Contended instances are
    /// skipped; they unlock on their next access.
    pub fn record_claimed(
        &self,
        user_id: &UserId,
        challenge_id: &ChallengeId,
        now: DateTime<Utc>,
    ) -> Vec<InstanceId> {
        self.claimed.insert((user_id.clone(), challenge_id.clone()));

        let mut unlocked = Vec::new();
        for id in self.user_ids(user_id) {
            let Some(cell) = self.instances.get(&id).map(|entry| Arc::clone(entry.value())) else {
                continue;
            };
            let Some(mut instance) = cell.try_lock_for(self.lock_timeout) else {
                tracing::warn!(instance = %id, "skipped unlocking contended instance");
                continue;
            };
            if instance.status == ChallengeStatus::Locked
                && instance.prerequisite.as_ref() == Some(challenge_id)
                && self.refresh(&mut instance, now) == Some(ChallengeStatus::Active)
            {
                unlocked.push(id);
            }
        }
        unlocked
    }

    /// Expire every open instance whose window has passed
    ///
    /// Returns the number of instances expired by this sweep.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut expired = 0;
        for cell in self.cells() {
            let Some(mut instance) = cell.try_lock_for(self.lock_timeout) else {
                continue;
            };
            if self.refresh(&mut instance, now) == Some(ChallengeStatus::Expired) {
                expired += 1;
            }
        }
        if expired > 0 {
            tracing::info!(expired, "expired challenge instances");
        }
        expired
    }

    /// Move closed instances whose window ended by `before` into history
    ///
    /// Closed means claimed, expired, or still locked after its window.
    /// Completed instances inside their claim grace stay live. Returns the
    /// number archived.
    pub fn archive_closed(&self, before: DateTime<Utc>, now: DateTime<Utc>) -> usize {
        let cutoff = before.min(now);
        let mut archived = 0;

        for cell in self.cells() {
            let Some(mut instance) = cell.try_lock_for(self.lock_timeout) else {
                continue;
            };
            self.refresh(&mut instance, now);

            let closed = matches!(
                instance.status,
                ChallengeStatus::Claimed | ChallengeStatus::Expired | ChallengeStatus::Locked
            );
            if !closed || instance.window_end > cutoff {
                continue;
            }

            self.instances.remove(&instance.id);
            self.archived.insert(instance.id);
            if let Some(mut ids) = self.by_user.get_mut(&instance.user_id) {
                ids.retain(|id| *id != instance.id);
            }
            self.history
                .entry(instance.user_id.clone())
                .or_default()
                .push(instance.clone());
            archived += 1;
        }

        if archived > 0 {
            tracing::info!(archived, before = %before, "archived closed challenge instances");
        }
        archived
    }

    /// Number of live instances
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether no instance is live
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    fn refresh(&self, instance: &mut ChallengeInstance, now: DateTime<Utc>) -> Option<ChallengeStatus> {
        if !instance.prerequisite_met {
            if let Some(prerequisite) = &instance.prerequisite {
                instance.prerequisite_met = self.has_claimed(&instance.user_id, prerequisite);
            }
        }
        instance.observe(now, self.claim_grace)
    }

    fn user_ids(&self, user_id: &UserId) -> Vec<InstanceId> {
        self.by_user
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    // Collected up front; the map must not be iterated while entries are removed.
    fn cells(&self) -> Vec<Arc<Mutex<ChallengeInstance>>> {
        self.instances
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    fn timeout(&self, id: InstanceId) -> QuestError {
        tracing::warn!(instance = %id, "challenge instance lock timed out");
        QuestError::conflict(format!("instance:{id}"), "lock wait timed out")
    }
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), chrono::Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use vitality_core::{ActivityKind, ChallengeType};

    fn day_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap()
    }

    fn window() -> Window {
        Window::new(day_start(), day_start() + chrono::Duration::days(1))
    }

    fn walk() -> Challenge {
        Challenge::new(
            "walk",
            ChallengeType::Daily,
            ActivityKind::Steps,
            100,
            day_start(),
            day_start() + chrono::Duration::days(30),
        )
        .with_reward(10, 1)
    }

    fn alice() -> UserId {
        UserId::from("alice")
    }

    #[test]
    fn ensure_is_idempotent_per_window() {
        let registry = InstanceRegistry::default();
        let (first, created) = registry.ensure(&alice(), &walk(), window(), day_start());
        let (second, again) = registry.ensure(&alice(), &walk(), window(), day_start());

        assert!(created);
        assert!(!again);
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);

        let next_day = Window::new(window().end, window().end + chrono::Duration::days(1));
        let (third, _) = registry.ensure(&alice(), &walk(), next_day, day_start());
        assert_ne!(first, third);
    }

    #[test]
    fn shifted_window_for_same_period_reuses_instance() {
        let registry = InstanceRegistry::default();
        let (first, _) = registry.ensure(&alice(), &walk(), window(), day_start());

        // Same local day seen from a +01:00 offset
        let hour = chrono::Duration::hours(1);
        let shifted = Window::new(window().start - hour, window().end - hour)
            .with_period(window().period);
        let (second, created) = registry.ensure(&alice(), &walk(), shifted, day_start());

        assert!(!created);
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn other_users_cannot_see_an_instance() {
        let registry = InstanceRegistry::default();
        let (id, _) = registry.ensure(&alice(), &walk(), window(), day_start());

        let err = registry
            .snapshot(&UserId::from("mallory"), id, day_start())
            .unwrap_err();
        assert!(matches!(err, QuestError::NotFound { .. }));
    }

    #[test]
    fn reads_observe_expiry() {
        let registry = InstanceRegistry::default();
        let (id, _) = registry.ensure(&alice(), &walk(), window(), day_start());

        let later = registry.snapshot(&alice(), id, window().end).unwrap();
        assert_eq!(later.status, ChallengeStatus::Expired);
    }

    #[test]
    fn sweep_counts_expired() {
        let registry = InstanceRegistry::default();
        registry.ensure(&alice(), &walk(), window(), day_start());
        registry.ensure(&UserId::from("bob"), &walk(), window(), day_start());

        assert_eq!(registry.sweep(day_start()), 0);
        assert_eq!(registry.sweep(window().end), 2);
        assert_eq!(registry.sweep(window().end), 0);
    }

    #[test]
    fn claiming_prerequisite_unlocks_dependents() {
        let registry = InstanceRegistry::default();
        let gated = walk().with_prerequisite("basics");
        let (id, _) = registry.ensure(&alice(), &gated, window(), day_start());
        assert_eq!(
            registry.snapshot(&alice(), id, day_start()).unwrap().status,
            ChallengeStatus::Locked
        );

        let unlocked = registry.record_claimed(&alice(), &ChallengeId::from("basics"), day_start());
        assert_eq!(unlocked, vec![id]);
        assert!(registry.has_claimed(&alice(), &ChallengeId::from("basics")));
        assert!(!registry.has_claimed(&UserId::from("bob"), &ChallengeId::from("basics")));
    }

    #[test]
    fn archive_moves_closed_instances_to_history() {
        let registry = InstanceRegistry::default();
        let (id, _) = registry.ensure(&alice(), &walk(), window(), day_start());
        let after = window().end + chrono::Duration::hours(1);

        assert_eq!(registry.archive_closed(window().end, after), 1);
        assert!(registry.is_empty());
        assert!(registry.for_user(&alice(), after).unwrap().is_empty());

        let history = registry.history(&alice());
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, ChallengeStatus::Expired);

        let err = registry.snapshot(&alice(), id, after).unwrap_err();
        assert!(matches!(err, QuestError::InvalidState { .. }));

        // The window key stays taken after archiving
        let (again, created) = registry.ensure(&alice(), &walk(), window(), after);
        assert_eq!(again, id);
        assert!(!created);
    }

    #[test]
    fn archive_keeps_open_instances() {
        let registry = InstanceRegistry::default();
        registry.ensure(&alice(), &walk(), window(), day_start());
        assert_eq!(registry.archive_closed(window().end, day_start()), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn contended_instance_reports_conflict() {
        let registry = InstanceRegistry::new(Duration::from_millis(10), chrono::Duration::zero());
        let (id, _) = registry.ensure(&alice(), &walk(), window(), day_start());
        let cell = registry.instances.get(&id).map(|e| Arc::clone(e.value())).unwrap();
        let _held = cell.lock();

        let err = registry.snapshot(&alice(), id, day_start()).unwrap_err();
        assert!(err.is_retryable());
    }
}

//! Per-user challenge instances
//!
//! An instance binds one challenge to one user for one window. Progress is
//! a running total clamped at the target; it only grows while `Active`.

use crate::catalog::Challenge;
use crate::lifecycle::{validate_transition, ChallengeStatus};
use crate::window::Window;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use vitality_core::{ChallengeId, InstanceId, QuestError, Result, TransactionId, UserId};

/// Outcome of a reward claim
///
/// Stored on the instance so a repeated claim can return it unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimResult {
    /// XP credited
    pub xp_granted: u64,
    /// Credits credited
    pub credits_granted: u64,
    /// Whether this call found the reward already paid
    pub already_claimed: bool,
    /// Ledger transaction that paid the reward
    pub transaction_id: TransactionId,
    /// When the reward was paid
    pub claimed_at: DateTime<Utc>,
}

impl ClaimResult {
    /// The stored result, as returned to a repeated claim
    #[inline]
    #[must_use]
    pub fn replayed(self) -> Self {
        Self {
            already_claimed: true,
            ..self
        }
    }
}

/// Result of applying progress to an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Instance
    pub instance_id: InstanceId,
    /// Challenge
    pub challenge_id: ChallengeId,
    /// Progress after the update
    pub progress: u64,
    /// Challenge target
    pub target: u64,
    /// Status after the update
    pub status: ChallengeStatus,
    /// Whether this update reached the target
    pub newly_completed: bool,
}

/// A challenge bound to a user for one window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeInstance {
    /// Identifier
    pub id: InstanceId,
    /// Owner
    pub user_id: UserId,
    /// Template
    pub challenge_id: ChallengeId,
    /// Inclusive window start
    pub window_start: DateTime<Utc>,
    /// Exclusive window end
    pub window_end: DateTime<Utc>,
    /// Local date naming the window
    pub period: NaiveDate,
    /// Goal copied from the template
    pub target: u64,
    /// XP paid on claim
    pub reward_xp: u64,
    /// Credits paid on claim
    pub reward_credits: u64,
    /// Running total, never above `target`
    pub progress: u64,
    /// Lifecycle state
    pub status: ChallengeStatus,
    /// Challenge that must be claimed before this one unlocks
    pub prerequisite: Option<ChallengeId>,
    /// Whether the prerequisite has been claimed
    pub prerequisite_met: bool,
    /// When the target was reached
    pub completed_at: Option<DateTime<Utc>>,
    /// Stored claim outcome
    pub claim: Option<ClaimResult>,
}

impl ChallengeInstance {
    /// Fresh instance with zero progress, starting `Locked`
    ///
    /// Call [`ChallengeInstance::observe`] to activate it.
    #[must_use]
    pub fn new(user_id: UserId, challenge: &Challenge, window: Window, prerequisite_met: bool) -> Self {
        Self {
            id: InstanceId::new(),
            user_id,
            challenge_id: challenge.id.clone(),
            window_start: window.start,
            window_end: window.end,
            period: window.period,
            target: challenge.target,
            reward_xp: challenge.reward_xp,
            reward_credits: challenge.reward_credits,
            progress: 0,
            status: ChallengeStatus::Locked,
            prerequisite: challenge.prerequisite.clone(),
            prerequisite_met: prerequisite_met || challenge.prerequisite.is_none(),
            completed_at: None,
            claim: None,
        }
    }

    /// Window of this instance
    #[inline]
    #[must_use]
    pub fn window(&self) -> Window {
        Window::new(self.window_start, self.window_end).with_period(self.period)
    }

    /// Whether a claim would pay out now
    #[inline]
    #[must_use]
    pub fn is_claimable(&self) -> bool {
        self.status == ChallengeStatus::Completed
    }

    /// Apply time-driven transitions as of `now`
    ///
    /// - `Locked` unlocks once the window has started and the prerequisite
    ///   is met.
    /// - `Active` expires at the window end.
    /// - `Completed` expires at the window end plus `claim_grace`.
    ///
    /// Returns the new status when it changed.
    pub fn observe(&mut self, now: DateTime<Utc>, claim_grace: Duration) -> Option<ChallengeStatus> {
        let next = match self.status {
            ChallengeStatus::Locked
                if self.prerequisite_met && self.window().contains(now) =>
            {
                ChallengeStatus::Active
            }
            ChallengeStatus::Active if now >= self.window_end => ChallengeStatus::Expired,
            ChallengeStatus::Completed if now >= self.window_end + claim_grace => {
                ChallengeStatus::Expired
            }
            _ => return None,
        };

        validate_transition(self.status, next).ok()?;
        tracing::debug!(
            instance = %self.id,
            user = %self.user_id,
            from = %self.status,
            to = %next,
            "challenge instance transitioned"
        );
        self.status = next;
        Some(next)
    }

    /// Add `delta` to the running total
    ///
    /// Progress is clamped at the target, and reaching it completes the
    /// instance. On `Completed` or `Claimed` the update is accepted and
    /// ignored.
    ///
    /// # Errors
    /// - `QuestError::InvalidArgument` for a negative delta
    /// - `QuestError::InvalidState` on a `Locked` or `Expired` instance
    pub fn record_progress(&mut self, delta: i64, now: DateTime<Utc>) -> Result<ProgressUpdate> {
        let delta = u64::try_from(delta).map_err(|_| {
            QuestError::invalid_argument(format!("progress delta must be non-negative, got {delta}"))
        })?;

        let mut newly_completed = false;
        match self.status {
            ChallengeStatus::Locked | ChallengeStatus::Expired => {
                return Err(QuestError::invalid_state("record progress", self.status));
            }
            ChallengeStatus::Completed | ChallengeStatus::Claimed => {}
            ChallengeStatus::Active => {
                self.progress = self.progress.saturating_add(delta).min(self.target);
                if self.progress >= self.target {
                    validate_transition(self.status, ChallengeStatus::Completed)?;
                    self.status = ChallengeStatus::Completed;
                    self.completed_at = Some(now);
                    newly_completed = true;
                }
            }
        }

        Ok(ProgressUpdate {
            instance_id: self.id,
            challenge_id: self.challenge_id.clone(),
            progress: self.progress,
            target: self.target,
            status: self.status,
            newly_completed,
        })
    }

    /// Record the payout and move to `Claimed`
    ///
    /// # Errors
    /// `QuestError::InvalidState` unless the instance is `Completed`
    pub fn mark_claimed(&mut self, result: ClaimResult) -> Result<()> {
        validate_transition(self.status, ChallengeStatus::Claimed)?;
        self.status = ChallengeStatus::Claimed;
        self.claim = Some(ClaimResult {
            already_claimed: false,
            ..result
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use vitality_core::{ActivityKind, ChallengeType};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap()
    }

    fn challenge() -> Challenge {
        Challenge::new(
            "walk",
            ChallengeType::Daily,
            ActivityKind::Steps,
            10_000,
            start(),
            start() + Duration::days(30),
        )
        .with_reward(50, 5)
    }

    fn active() -> ChallengeInstance {
        let mut instance = ChallengeInstance::new(
            UserId::from("alice"),
            &challenge(),
            Window::new(start(), start() + Duration::days(1)),
            false,
        );
        instance.observe(start(), Duration::zero());
        instance
    }

    fn claim_result() -> ClaimResult {
        ClaimResult {
            xp_granted: 50,
            credits_granted: 5,
            already_claimed: false,
            transaction_id: TransactionId::new(),
            claimed_at: start(),
        }
    }

    #[test]
    fn no_prerequisite_activates_at_window_start() {
        let instance = active();
        assert_eq!(instance.status, ChallengeStatus::Active);
        assert_eq!(instance.progress, 0);
    }

    #[test]
    fn future_window_stays_locked() {
        let mut instance = ChallengeInstance::new(
            UserId::from("alice"),
            &challenge(),
            Window::new(start(), start() + Duration::days(1)),
            false,
        );
        assert_eq!(instance.observe(start() - Duration::hours(1), Duration::zero()), None);
        assert_eq!(instance.status, ChallengeStatus::Locked);
    }

    #[test]
    fn unmet_prerequisite_stays_locked() {
        let gated = challenge().with_prerequisite("basics");
        let window = Window::new(start(), start() + Duration::days(1));
        let mut instance = ChallengeInstance::new(UserId::from("alice"), &gated, window, false);

        assert_eq!(instance.observe(start(), Duration::zero()), None);
        assert!(instance.record_progress(10, start()).is_err());

        instance.prerequisite_met = true;
        assert_eq!(
            instance.observe(start(), Duration::zero()),
            Some(ChallengeStatus::Active)
        );
    }

    #[test]
    fn progress_clamps_and_completes() {
        let mut instance = active();
        let first = instance.record_progress(7_500, start()).unwrap();
        assert_eq!(first.progress, 7_500);
        assert!(!first.newly_completed);

        let second = instance.record_progress(3_000, start()).unwrap();
        assert_eq!(second.progress, 10_000);
        assert_eq!(second.status, ChallengeStatus::Completed);
        assert!(second.newly_completed);
        assert_eq!(instance.completed_at, Some(start()));
    }

    #[test]
    fn progress_after_completion_is_a_no_op() {
        let mut instance = active();
        instance.record_progress(10_000, start()).unwrap();

        let update = instance.record_progress(500, start()).unwrap();
        assert_eq!(update.progress, 10_000);
        assert!(!update.newly_completed);

        instance.mark_claimed(claim_result()).unwrap();
        let update = instance.record_progress(500, start()).unwrap();
        assert_eq!(update.status, ChallengeStatus::Claimed);
    }

    #[test]
    fn negative_delta_is_rejected() {
        let mut instance = active();
        let err = instance.record_progress(-1, start()).unwrap_err();
        assert!(matches!(err, QuestError::InvalidArgument(_)));
        assert_eq!(instance.progress, 0);
    }

    #[test]
    fn active_expires_at_window_end() {
        let mut instance = active();
        let end = instance.window_end;
        assert_eq!(instance.observe(end - Duration::seconds(1), Duration::zero()), None);
        assert_eq!(
            instance.observe(end, Duration::zero()),
            Some(ChallengeStatus::Expired)
        );

        let err = instance.record_progress(1, end).unwrap_err();
        assert!(matches!(err, QuestError::InvalidState { .. }));
    }

    #[test]
    fn completed_survives_grace() {
        let mut instance = active();
        instance.record_progress(10_000, start()).unwrap();
        let end = instance.window_end;
        let grace = Duration::hours(2);

        assert_eq!(instance.observe(end + Duration::hours(1), grace), None);
        assert!(instance.is_claimable());
        assert_eq!(
            instance.observe(end + grace, grace),
            Some(ChallengeStatus::Expired)
        );
        assert!(!instance.is_claimable());
    }

    #[test]
    fn claimed_never_expires() {
        let mut instance = active();
        instance.record_progress(10_000, start()).unwrap();
        instance.mark_claimed(claim_result()).unwrap();

        assert_eq!(instance.observe(start() + Duration::days(10), Duration::zero()), None);
        assert_eq!(instance.status, ChallengeStatus::Claimed);
    }

    #[test]
    fn claim_requires_completed() {
        let mut instance = active();
        assert!(instance.mark_claimed(claim_result()).is_err());
        assert!(instance.claim.is_none());
    }
}

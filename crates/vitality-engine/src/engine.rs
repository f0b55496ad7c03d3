//! Rewards engine facade
//!
//! Wires the components together and owns the clock:
//! - activity intake feeds the streak tracker and matching challenges
//! - claims and conversions go through the ledger
//! - levels and leaderboards are derived from the ledger
//! - committed changes are announced on the event bus

use crate::activity::{ActivityLog, ActivityOutcome, SkippedInstance};
use crate::bus::EventBus;
use crate::claim::{claim_reward, ClaimResult};
use crate::conversion::{convert_credits, ConversionPolicy, ConversionResult};
use chrono::{DateTime, FixedOffset, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use vitality_challenge::{
    window_for, Challenge, ChallengeCatalog, ChallengeInstance, ChallengeStatus, InstanceRegistry,
    ProgressUpdate,
};
use vitality_core::{
    ActivityEvent, ActivityKind, ChallengeId, Clock, EngineConfig, EngineEvent, EntityKind,
    InstanceId, LeaderboardScope, Period, QuestError, RequestId, Result, SystemClock, UserId,
    UserProfile,
};
use vitality_leaderboard::{LeaderboardSnapshot, PeriodWindow, Ranker, Roster, SnapshotStore};
use vitality_ledger::{
    AccountBalance, InMemoryLedger, IntegrityReport, LedgerEntry, LedgerStore, LedgerTransaction,
    SourceId, TransactionReason,
};
use vitality_progression::{local_day, LevelProgress, LevelTable, StreakState, StreakTracker};

/// Offsets must stay strictly inside one day
const MAX_OFFSET_MINUTES: i32 = 24 * 60 - 1;

/// What one sweep changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Instances moved to `Expired`
    pub expired: usize,
    /// Streaks broken because yesterday held no activity
    pub streaks_broken: usize,
}

/// Progression and rewards engine
#[derive(Debug)]
pub struct RewardsEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    levels: LevelTable,
    conversion: ConversionPolicy,
    ledger: Arc<dyn LedgerStore>,
    streaks: StreakTracker,
    catalog: ChallengeCatalog,
    registry: InstanceRegistry,
    roster: Roster,
    ranker: Ranker,
    snapshots: SnapshotStore,
    activity: ActivityLog,
    events: EventBus,
    /// Serializes snapshot generation per engine
    ranking: Mutex<()>,
}

impl RewardsEngine {
    /// Engine on the wall clock with an in-memory ledger
    ///
    /// # Errors
    /// `QuestError::Config` if the configuration does not validate
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Engine on `clock` with an in-memory ledger
    ///
    /// # Errors
    /// `QuestError::Config` if the configuration does not validate
    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let ledger = Arc::new(InMemoryLedger::new(config.concurrency.lock_timeout()));
        Self::with_parts(config, clock, ledger)
    }

    /// Engine on `clock` over an existing ledger store
    ///
    /// # Errors
    /// `QuestError::Config` if the configuration does not validate
    pub fn with_parts(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        ledger: Arc<dyn LedgerStore>,
    ) -> Result<Self> {
        config.validate()?;
        let levels = LevelTable::from_config(&config.levels)?;

        tracing::info!(
            max_level = levels.max_level(),
            xp_per_credit = config.conversion.xp_per_credit,
            reserve_floor_xp = config.conversion.reserve_floor_xp,
            "rewards engine initialized"
        );

        Ok(Self {
            conversion: ConversionPolicy::from_config(&config.conversion),
            registry: InstanceRegistry::new(
                config.concurrency.lock_timeout(),
                config.challenges.claim_grace(),
            ),
            ranker: Ranker::from_config(&config.leaderboard),
            levels,
            clock,
            ledger,
            streaks: StreakTracker::new(),
            catalog: ChallengeCatalog::new(),
            roster: Roster::new(),
            snapshots: SnapshotStore::new(),
            activity: ActivityLog::new(),
            events: EventBus::default(),
            ranking: Mutex::new(()),
            config,
        })
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Engine clock
    #[inline]
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Level curve
    #[inline]
    #[must_use]
    pub fn levels(&self) -> &LevelTable {
        &self.levels
    }

    /// Conversion policy
    #[inline]
    #[must_use]
    pub fn conversion_policy(&self) -> ConversionPolicy {
        self.conversion
    }

    /// Underlying ledger
    #[inline]
    #[must_use]
    pub fn ledger(&self) -> &dyn LedgerStore {
        self.ledger.as_ref()
    }

    /// Activity log
    #[inline]
    #[must_use]
    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    /// Published challenges
    #[inline]
    #[must_use]
    pub fn catalog(&self) -> &ChallengeCatalog {
        &self.catalog
    }

    /// Register or update a user profile
    ///
    /// # Errors
    /// `QuestError::InvalidArgument` if the UTC offset is out of range
    pub fn register_user(&self, profile: UserProfile) -> Result<()> {
        if let Some(minutes) = profile.utc_offset_minutes {
            if minutes.abs() > MAX_OFFSET_MINUTES {
                return Err(QuestError::invalid_argument(format!(
                    "UTC offset {minutes} minutes is out of range"
                )));
            }
        }
        let user = profile.id.clone();
        if self.roster.register(profile).is_some() {
            tracing::debug!(user = %user, "user profile updated");
        } else {
            tracing::info!(user = %user, "user registered");
        }
        Ok(())
    }

    /// Publish a challenge template
    ///
    /// # Errors
    /// - `QuestError::InvalidArgument` for an invalid or duplicate template
    /// - `QuestError::NotFound` for an unknown prerequisite
    pub fn publish_challenge(&self, challenge: Challenge) -> Result<Arc<Challenge>> {
        self.catalog.publish(challenge)
    }

    /// Log an activity event and apply it to streaks and matching challenges
    ///
    /// The event's timestamp selects the challenge window, while the
    /// instance's state is judged at the engine clock. An event for a window
    /// that is not open at that clock only counts toward the streak and is
    /// reported in `skipped`.
    ///
    /// # Errors
    /// - `QuestError::InvalidArgument` for a negative quantity
    /// - `QuestError::NotFound` for an unknown user
    pub fn record_activity(
        &self,
        user_id: &UserId,
        kind: ActivityKind,
        quantity: i64,
        timestamp: DateTime<Utc>,
    ) -> Result<ActivityOutcome> {
        if quantity < 0 {
            return Err(QuestError::invalid_argument(format!(
                "activity quantity must be non-negative, got {quantity}"
            )));
        }
        let offset = self.offset_for(user_id)?;
        let now = self.clock.now();

        let event = ActivityEvent::new(user_id.clone(), kind.clone(), quantity, timestamp);
        self.activity.append(event.clone());
        metrics::counter!("vitality_activity_events_total").increment(1);

        let streak = self
            .config
            .streaks
            .qualifies(&kind, quantity)
            .then(|| self.streaks.record_at(user_id, timestamp, offset));

        let mut progress = Vec::new();
        let mut deferred = Vec::new();
        let mut skipped = Vec::new();
        for challenge in self.catalog.for_activity(&kind) {
            let Some(window) =
                window_for(&challenge, timestamp, offset, self.config.challenges.week_starts_on)
            else {
                continue;
            };
            let (id, _) = self.registry.ensure(user_id, &challenge, window, now);

            let applied = self.registry.with_instance(user_id, id, now, |instance| {
                match instance.status {
                    ChallengeStatus::Locked | ChallengeStatus::Expired => Ok(Err(instance.status)),
                    _ => instance.record_progress(quantity, now).map(Ok),
                }
            });
            match applied {
                Ok(Ok(update)) => {
                    self.announce_completion(user_id, &update, now);
                    progress.push(update);
                }
                Ok(Err(status)) => {
                    tracing::debug!(
                        instance = %id,
                        status = %status,
                        "activity not applied to instance"
                    );
                    skipped.push(SkippedInstance {
                        instance_id: id,
                        challenge_id: challenge.id.clone(),
                        status,
                    });
                }
                // archived
                Err(QuestError::InvalidState { operation, state }) => {
                    tracing::debug!(
                        instance = %id,
                        operation,
                        state = %state,
                        "activity not applied to instance"
                    );
                }
                Err(err) if err.is_retryable() => {
                    tracing::warn!(instance = %id, error = %err, "instance progress deferred");
                    deferred.push(id);
                }
                Err(err) => return Err(err),
            }
        }

        Ok(ActivityOutcome {
            event,
            streak,
            progress,
            deferred,
            skipped,
        })
    }

    /// Create the user's instance for the window of `challenge_id` at `at`
    ///
    /// # Errors
    /// - `QuestError::NotFound` for an unknown user or challenge
    /// - `QuestError::InvalidArgument` if the challenge is not available at `at`
    pub fn open_window(
        &self,
        user_id: &UserId,
        challenge_id: &ChallengeId,
        at: DateTime<Utc>,
    ) -> Result<ChallengeInstance> {
        let offset = self.offset_for(user_id)?;
        let challenge = self.catalog.get(challenge_id)?;
        let window = window_for(&challenge, at, offset, self.config.challenges.week_starts_on)
            .ok_or_else(|| {
                QuestError::invalid_argument(format!(
                    "challenge {challenge_id} is not available at {at}"
                ))
            })?;

        let now = self.clock.now();
        let (id, _) = self.registry.ensure(user_id, &challenge, window, now);
        self.registry.snapshot(user_id, id, now)
    }

    /// Add `delta` progress to one instance
    ///
    /// # Errors
    /// - `QuestError::InvalidArgument` for a negative delta
    /// - `QuestError::InvalidState` if the instance is locked or expired
    /// - `QuestError::NotFound` if the instance is not the user's
    /// - `QuestError::Conflict` on lock timeout
    pub fn record_progress(
        &self,
        user_id: &UserId,
        instance_id: InstanceId,
        delta: i64,
    ) -> Result<ProgressUpdate> {
        let now = self.clock.now();
        let update = self
            .registry
            .with_instance(user_id, instance_id, now, |instance| {
                instance.record_progress(delta, now)
            })?;
        self.announce_completion(user_id, &update, now);
        Ok(update)
    }

    /// Claim the reward of a completed instance
    ///
    /// Repeated claims return the stored result with `already_claimed`.
    ///
    /// # Errors
    /// - `QuestError::NotFound` if the instance is not the user's
    /// - `QuestError::InvalidState` unless the instance is completed or claimed
    /// - `QuestError::Conflict` on lock timeout
    pub fn claim(&self, user_id: &UserId, instance_id: InstanceId) -> Result<ClaimResult> {
        let now = self.clock.now();
        let outcome = match claim_reward(
            &self.registry,
            self.ledger.as_ref(),
            user_id,
            instance_id,
            now,
        ) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(user = %user_id, instance = %instance_id, error = %err, "claim rejected");
                return Err(err);
            }
        };

        let result = outcome.result;
        if result.already_claimed {
            metrics::counter!("vitality_claim_replays_total").increment(1);
            tracing::debug!(user = %user_id, instance = %instance_id, "claim replayed");
            return Ok(result);
        }

        metrics::counter!("vitality_claims_total").increment(1);
        tracing::info!(
            user = %user_id,
            instance = %instance_id,
            challenge = %outcome.challenge_id,
            xp = result.xp_granted,
            credits = result.credits_granted,
            "reward claimed"
        );

        let unlocked = self
            .registry
            .record_claimed(user_id, &outcome.challenge_id, now);
        if !unlocked.is_empty() {
            tracing::info!(user = %user_id, unlocked = unlocked.len(), "dependent challenges unlocked");
        }

        self.events.publish(EngineEvent::RewardClaimed {
            user_id: user_id.clone(),
            instance_id,
            xp_granted: result.xp_granted,
            credits_granted: result.credits_granted,
            at: now,
        });
        if let Some((before, after)) = outcome.lifetime_xp {
            self.announce_level_change(user_id, before, after, now);
        }
        Ok(result)
    }

    /// Convert XP to `credits` under an idempotency key
    ///
    /// # Errors
    /// - `QuestError::NotFound` for an unknown user
    /// - `QuestError::InvalidArgument` for zero credits
    /// - `QuestError::InsufficientBalance` if the debit would cross the floor
    /// - `QuestError::Conflict` on lock timeout
    pub fn convert(
        &self,
        user_id: &UserId,
        credits: u64,
        request_id: RequestId,
    ) -> Result<ConversionResult> {
        self.profile(user_id)?;
        convert_credits(
            self.ledger.as_ref(),
            self.conversion,
            user_id,
            credits,
            request_id,
            self.clock.now(),
        )
        .map_err(|err| {
            tracing::warn!(user = %user_id, credits, error = %err, "conversion rejected");
            err
        })
    }

    /// Operator grant of XP and credits under an idempotency key
    ///
    /// # Errors
    /// - `QuestError::NotFound` for an unknown user
    /// - `QuestError::InvalidArgument` if an amount overflows
    /// - `QuestError::Conflict` on lock timeout
    pub fn grant(
        &self,
        user_id: &UserId,
        xp: u64,
        credits: u64,
        request_id: RequestId,
    ) -> Result<LedgerTransaction> {
        self.profile(user_id)?;
        let now = self.clock.now();
        let entry = LedgerEntry::new(
            user_id.clone(),
            i64::try_from(xp).map_err(|_| QuestError::invalid_argument("XP out of range"))?,
            i64::try_from(credits)
                .map_err(|_| QuestError::invalid_argument("credits out of range"))?,
            TransactionReason::Adjustment,
            SourceId::Adjustment(request_id),
            now,
        );

        let outcome = self.ledger.apply(entry)?;
        let tx = outcome.transaction().clone();
        if !outcome.is_replay() {
            tracing::info!(user = %user_id, xp, credits, "adjustment granted");
            let after = outcome.balance().lifetime_xp;
            self.announce_level_change(user_id, after - tx.earned_xp(), after, now);
        }
        Ok(tx)
    }

    /// Level derived from lifetime XP
    ///
    /// # Errors
    /// - `QuestError::NotFound` for an unknown user
    /// - `QuestError::Conflict` on lock timeout
    pub fn get_level(&self, user_id: &UserId) -> Result<LevelProgress> {
        let balance = self.balance(user_id)?;
        Ok(self.levels.progress(balance.lifetime_xp))
    }

    /// Streak as of the user's current local day
    ///
    /// # Errors
    /// `QuestError::NotFound` for an unknown user
    pub fn get_streak(&self, user_id: &UserId) -> Result<StreakState> {
        let offset = self.offset_for(user_id)?;
        let today = local_day(self.clock.now(), offset);
        let state = self
            .streaks
            .state(user_id)
            .unwrap_or_else(|| StreakState::new(user_id.clone()));
        Ok(StreakState {
            current_streak: state.streak_on(today),
            ..state
        })
    }

    /// Rebuild a user's streak from the activity log
    ///
    /// # Errors
    /// `QuestError::NotFound` for an unknown user
    pub fn rebuild_streak(&self, user_id: &UserId) -> Result<StreakState> {
        let offset = self.offset_for(user_id)?;
        let events = self.activity.for_user(user_id);
        Ok(self
            .streaks
            .rebuild(user_id, &events, &self.config.streaks, offset))
    }

    /// Current account balance
    ///
    /// # Errors
    /// - `QuestError::NotFound` for an unknown user
    /// - `QuestError::Conflict` on lock timeout
    pub fn balance(&self, user_id: &UserId) -> Result<AccountBalance> {
        self.profile(user_id)?;
        Ok(self
            .ledger
            .balance(user_id)?
            .unwrap_or_else(|| AccountBalance::new(user_id.clone())))
    }

    /// The user's live instances
    ///
    /// # Errors
    /// `QuestError::Conflict` if an instance stays locked past the timeout
    pub fn instances(&self, user_id: &UserId) -> Result<Vec<ChallengeInstance>> {
        self.registry.for_user(user_id, self.clock.now())
    }

    /// The user's archived instances
    #[must_use]
    pub fn history(&self, user_id: &UserId) -> Vec<ChallengeInstance> {
        self.registry.history(user_id)
    }

    /// Rank `scope` over the current `period`
    ///
    /// Each call produces a new snapshot whose rank deltas are measured
    /// against the previous snapshot of the same scope and period.
    ///
    /// # Errors
    /// `QuestError::NotFound` for a department or team without members
    pub fn get_leaderboard(
        &self,
        scope: LeaderboardScope,
        period: Period,
    ) -> Result<Arc<LeaderboardSnapshot>> {
        let _ranking = self.ranking.lock();

        let profiles = self.roster.snapshot();
        let known = match &scope {
            LeaderboardScope::Department(id) => {
                profiles.iter().any(|p| p.department.as_ref() == Some(id))
            }
            LeaderboardScope::Team(id) => profiles.iter().any(|p| p.team.as_ref() == Some(id)),
            _ => true,
        };
        if !known {
            return Err(QuestError::not_found(EntityKind::Unit, &scope));
        }

        let now = self.clock.now();
        let window = PeriodWindow::resolve(
            period,
            now,
            self.config.streaks.timezone.resolve(None),
            self.config.challenges.week_starts_on,
        );
        let view = self.ledger.view();
        let previous = self.snapshots.latest(&scope, period);
        let snapshot = Arc::new(self.ranker.rank(
            &view,
            &profiles,
            &scope,
            window,
            now,
            previous.as_deref(),
        ));

        if let Some(previous) = &previous {
            for change in snapshot.changes_since(previous) {
                self.events.publish(EngineEvent::RankChanged {
                    scope: scope.clone(),
                    period,
                    entity: change.entity,
                    previous_rank: change.previous_rank,
                    rank: change.rank,
                });
            }
        }
        self.snapshots.push(Arc::clone(&snapshot));

        metrics::counter!("vitality_snapshots_total").increment(1);
        tracing::info!(
            scope = %scope,
            period = %period,
            ledger_version = snapshot.ledger_version,
            entries = snapshot.entries.len(),
            "leaderboard snapshot generated"
        );
        Ok(snapshot)
    }

    /// Retained snapshots of `(scope, period)`, oldest first
    #[must_use]
    pub fn leaderboard_history(
        &self,
        scope: &LeaderboardScope,
        period: Period,
    ) -> Vec<Arc<LeaderboardSnapshot>> {
        self.snapshots.retained(scope, period)
    }

    /// Expire passed windows and close yesterday for every streak
    pub fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let expired = self.registry.sweep(now);

        let mut streaks_broken = 0;
        for user_id in self.streaks.users() {
            let offset = self
                .roster
                .get(&user_id)
                .map_or_else(|| self.config.streaks.timezone.resolve(None), |profile| {
                    self.config.streaks.timezone.resolve(profile.utc_offset_minutes)
                });
            let Some(yesterday) = local_day(now, offset).pred_opt() else {
                continue;
            };
            let before = self
                .streaks
                .state(&user_id)
                .map_or(0, |state| state.current_streak);
            let after = self
                .streaks
                .close_day(&user_id, yesterday)
                .map_or(0, |state| state.current_streak);
            if before > 0 && after == 0 {
                streaks_broken += 1;
            }
        }

        let report = SweepReport {
            expired,
            streaks_broken,
        };
        tracing::debug!(expired, streaks_broken, "sweep finished");
        report
    }

    /// Archive closed instances whose window ended by `before`
    pub fn archive_closed(&self, before: DateTime<Utc>) -> usize {
        self.registry.archive_closed(before, self.clock.now())
    }

    /// Receive engine events published from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Verify the ledger journal and balances
    ///
    /// # Errors
    /// `QuestError::Integrity` naming the first inconsistency
    pub fn verify_ledger(&self) -> Result<IntegrityReport> {
        self.ledger.verify_integrity()
    }

    fn profile(&self, user_id: &UserId) -> Result<UserProfile> {
        self.roster
            .get(user_id)
            .ok_or_else(|| QuestError::not_found(EntityKind::User, user_id))
    }

    fn offset_for(&self, user_id: &UserId) -> Result<FixedOffset> {
        let profile = self.profile(user_id)?;
        Ok(self
            .config
            .streaks
            .timezone
            .resolve(profile.utc_offset_minutes))
    }

    fn announce_completion(&self, user_id: &UserId, update: &ProgressUpdate, now: DateTime<Utc>) {
        if !update.newly_completed {
            return;
        }
        tracing::info!(
            user = %user_id,
            instance = %update.instance_id,
            challenge = %update.challenge_id,
            "challenge completed"
        );
        self.events.publish(EngineEvent::ChallengeCompleted {
            user_id: user_id.clone(),
            instance_id: update.instance_id,
            challenge_id: update.challenge_id.clone(),
            at: now,
        });
    }

    fn announce_level_change(&self, user_id: &UserId, before: u64, after: u64, now: DateTime<Utc>) {
        if let Some((from_level, to_level)) = self.levels.level_change(before, after) {
            tracing::info!(user = %user_id, from_level, to_level, "level up");
            self.events.publish(EngineEvent::LevelUp {
                user_id: user_id.clone(),
                from_level,
                to_level,
                at: now,
            });
        }
    }
}

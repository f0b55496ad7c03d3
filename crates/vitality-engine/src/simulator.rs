//! Seeded workload simulator
//!
//! Drives a [`RewardsEngine`] through simulated days of concurrent
//! activity, claims, conversions and ranking, then checks the ledger:
//! - the journal chain and balances verify
//! - every claim and conversion source appears at most once per user
//! - no conversion left an account below the reserve floor
//! - fresh claims and conversions match the journal one to one
//! - the all-time leaderboard accounts for every XP point earned

use crate::engine::RewardsEngine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::thread;
use vitality_challenge::{Challenge, ChallengeStatus};
use vitality_core::{
    ActivityKind, ChallengeType, Clock, EngineConfig, LeaderboardScope, ManualClock, Period,
    QuestError, RequestId, UserId, UserProfile,
};
use vitality_ledger::{SourceId, TransactionReason};

/// Simulator configuration
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Registered users
    pub users: usize,
    /// Simulated days
    pub days: u32,
    /// Operations per simulated day, spread over all threads
    pub operations_per_day: u64,
    /// Worker threads
    pub threads: usize,
    /// XP kept out of conversions
    pub reserve_floor_xp: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            users: 16,
            days: 14,
            operations_per_day: 500,
            threads: 4,
            reserve_floor_xp: 50,
        }
    }
}

/// Invariant broken during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// Journal or balances failed verification
    Integrity {
        /// Verification error
        error: String,
    },
    /// Source applied more than once for a user
    DuplicateSource {
        /// Account
        user_id: UserId,
        /// Repeated source
        source: String,
    },
    /// A conversion took the balance below the floor
    FloorBreached {
        /// Account
        user_id: UserId,
        /// Journal sequence of the conversion
        sequence: u64,
        /// Balance after it
        total_xp: i64,
    },
    /// Fresh operations and journal records disagree
    CountMismatch {
        /// Operation kind
        operation: &'static str,
        /// Fresh successes reported to callers
        reported: u64,
        /// Records in the journal
        journal: u64,
    },
    /// Leaderboard total differs from the journal
    LeaderboardMismatch {
        /// Earned XP in the journal
        expected: u64,
        /// Sum of leaderboard scores
        actual: u64,
    },
    /// An operation failed in a way its inputs rule out
    UnexpectedError {
        /// Operation
        operation: &'static str,
        /// Error
        error: String,
    },
}

/// Counters for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SimulatorStats {
    /// Activity events recorded
    pub activities: u64,
    /// Instances completed by activity
    pub completions: u64,
    /// First claims
    pub claims: u64,
    /// Repeated claims
    pub claim_replays: u64,
    /// Claims on instances that were not claimable
    pub claims_rejected: u64,
    /// First conversions
    pub conversions: u64,
    /// Repeated conversion requests
    pub conversion_replays: u64,
    /// Conversions refused for insufficient XP
    pub conversions_rejected: u64,
    /// Leaderboard snapshots generated
    pub snapshots: u64,
    /// Operations that hit lock contention
    pub conflicts: u64,
    /// Instances expired by sweeps
    pub expired: u64,
    /// Streaks broken by sweeps
    pub streaks_broken: u64,
    /// Instances archived at the end
    pub archived: u64,
}

impl SimulatorStats {
    fn merge(&mut self, other: &Self) {
        self.activities += other.activities;
        self.completions += other.completions;
        self.claims += other.claims;
        self.claim_replays += other.claim_replays;
        self.claims_rejected += other.claims_rejected;
        self.conversions += other.conversions;
        self.conversion_replays += other.conversion_replays;
        self.conversions_rejected += other.conversions_rejected;
        self.snapshots += other.snapshots;
        self.conflicts += other.conflicts;
    }
}

/// Final report from simulator
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorReport {
    /// Configuration the run used
    pub config: SimulatorConfig,
    /// Counters
    pub stats: SimulatorStats,
    /// Journal length at the end
    pub ledger_transactions: u64,
    /// Broken invariants
    pub violations: Vec<Violation>,
}

impl SimulatorReport {
    /// Check if the run broke no invariant
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Generate text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let stats = &self.stats;
        let mut report = String::new();

        report.push_str("=== Vitality Simulator Report ===\n\n");
        report.push_str(&format!("Seed: {}\n", self.config.seed));
        report.push_str(&format!(
            "Users: {}  Days: {}  Threads: {}\n",
            self.config.users, self.config.days, self.config.threads
        ));
        report.push_str(&format!("Activities: {}\n", stats.activities));
        report.push_str(&format!("Completions: {}\n", stats.completions));
        report.push_str(&format!(
            "Claims: {} (replayed {}, rejected {})\n",
            stats.claims, stats.claim_replays, stats.claims_rejected
        ));
        report.push_str(&format!(
            "Conversions: {} (replayed {}, rejected {})\n",
            stats.conversions, stats.conversion_replays, stats.conversions_rejected
        ));
        report.push_str(&format!("Snapshots: {}\n", stats.snapshots));
        report.push_str(&format!("Conflicts: {}\n", stats.conflicts));
        report.push_str(&format!(
            "Expired: {}  Archived: {}  Streaks Broken: {}\n",
            stats.expired, stats.archived, stats.streaks_broken
        ));
        report.push_str(&format!("Ledger Transactions: {}\n", self.ledger_transactions));
        report.push_str(&format!("Violations: {}\n", self.violations.len()));

        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (i, v) in self.violations.iter().enumerate() {
                report.push_str(&format!("{}. {:?}\n", i + 1, v));
            }
        }

        report.push_str(&format!(
            "\n=== Result: {} ===\n",
            if self.passed() { "PASS" } else { "FAIL" }
        ));
        report
    }
}

/// Run the simulator
///
/// # Errors
/// Configuration errors from building the engine or its catalog
pub fn run_simulator(config: SimulatorConfig) -> vitality_core::Result<SimulatorReport> {
    let origin = simulation_start();
    let clock = Arc::new(ManualClock::new(origin));
    let engine = RewardsEngine::with_clock(
        EngineConfig::default().with_reserve_floor_xp(config.reserve_floor_xp),
        clock.clone(),
    )?;

    let users: Vec<UserId> = (0..config.users)
        .map(|i| UserId::new(format!("user-{i:03}")))
        .collect();
    for (i, user) in users.iter().enumerate() {
        engine.register_user(
            UserProfile::new(user.clone())
                .with_department(format!("dept-{}", i % 3))
                .with_team(format!("team-{}", i % 5)),
        )?;
    }
    publish_catalog(&engine, origin, config.days)?;

    let mut stats = SimulatorStats::default();
    let mut violations = Vec::new();
    let threads = config.threads.max(1);

    for day in 0..config.days {
        clock.set(origin + Duration::days(i64::from(day)) + Duration::hours(8));

        let results: Vec<(SimulatorStats, Vec<Violation>)> = thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|worker| {
                    let share = config.operations_per_day / threads as u64
                        + u64::from((worker as u64) < config.operations_per_day % threads as u64);
                    let seed = config.seed ^ ((u64::from(day) << 32) | worker as u64);
                    let engine = &engine;
                    let users = &users;
                    scope.spawn(move || {
                        let mut rng = StdRng::seed_from_u64(seed);
                        run_worker(engine, users, &mut rng, share)
                    })
                })
                .collect();
            handles
                .into_iter()
                .filter_map(|handle| handle.join().ok())
                .collect()
        });
        for (worker_stats, worker_violations) in results {
            stats.merge(&worker_stats);
            violations.extend(worker_violations);
        }

        match engine.get_leaderboard(LeaderboardScope::Teams, Period::Weekly) {
            Ok(_) => stats.snapshots += 1,
            Err(err) => violations.push(unexpected("leaderboard", &err)),
        }

        clock.advance(Duration::days(1));
        let sweep = engine.sweep();
        stats.expired += sweep.expired as u64;
        stats.streaks_broken += sweep.streaks_broken as u64;
    }

    stats.archived = engine.archive_closed(clock.now()) as u64;
    verify(&engine, config.reserve_floor_xp, &stats, &mut violations);

    let ledger_transactions = engine.ledger().view().version();
    tracing::info!(
        seed = config.seed,
        transactions = ledger_transactions,
        violations = violations.len(),
        "simulation finished"
    );

    Ok(SimulatorReport {
        config,
        stats,
        ledger_transactions,
        violations,
    })
}

fn simulation_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn publish_catalog(
    engine: &RewardsEngine,
    origin: DateTime<Utc>,
    days: u32,
) -> vitality_core::Result<()> {
    let end = origin + Duration::days(i64::from(days.max(1)) + 7);
    engine.publish_challenge(
        Challenge::new(
            "daily-steps",
            ChallengeType::Daily,
            ActivityKind::Steps,
            8_000,
            origin,
            end,
        )
        .with_name("Walk 8,000 steps")
        .with_reward(50, 5),
    )?;
    engine.publish_challenge(
        Challenge::new(
            "daily-water",
            ChallengeType::Daily,
            ActivityKind::WaterGlasses,
            8,
            origin,
            end,
        )
        .with_reward(20, 2),
    )?;
    engine.publish_challenge(
        Challenge::new(
            "weekly-active",
            ChallengeType::Weekly,
            ActivityKind::ActiveMinutes,
            150,
            origin,
            end,
        )
        .with_reward(150, 15),
    )?;
    engine.publish_challenge(
        Challenge::new(
            "mindful-fortnight",
            ChallengeType::Special,
            ActivityKind::MeditationMinutes,
            120,
            origin,
            end,
        )
        .with_prerequisite("daily-steps")
        .with_reward(300, 30),
    )?;
    Ok(())
}

fn run_worker(
    engine: &RewardsEngine,
    users: &[UserId],
    rng: &mut StdRng,
    operations: u64,
) -> (SimulatorStats, Vec<Violation>) {
    let mut stats = SimulatorStats::default();
    let mut violations = Vec::new();
    if users.is_empty() {
        return (stats, violations);
    }

    for _ in 0..operations {
        let user = &users[rng.random_range(0..users.len())];
        match rng.random_range(0..100u32) {
            0..=54 => {
                let (kind, quantity) = match rng.random_range(0..4u32) {
                    0 => (ActivityKind::Steps, rng.random_range(0..3_000i64)),
                    1 => (ActivityKind::WaterGlasses, rng.random_range(0..3i64)),
                    2 => (ActivityKind::ActiveMinutes, rng.random_range(0..40i64)),
                    _ => (ActivityKind::MeditationMinutes, rng.random_range(0..20i64)),
                };
                match engine.record_activity(user, kind, quantity, engine.clock().now()) {
                    Ok(outcome) => {
                        stats.activities += 1;
                        stats.completions += outcome.completed().count() as u64;
                        stats.conflicts += outcome.deferred.len() as u64;
                    }
                    Err(err) => violations.push(unexpected("record_activity", &err)),
                }
            }
            55..=79 => claim_one(engine, user, rng, &mut stats, &mut violations),
            80..=94 => {
                let credits = rng.random_range(1..20u64);
                let request = RequestId::new(format!("req-{}", rng.random_range(0..40u32)));
                match engine.convert(user, credits, request) {
                    Ok(result) if result.already_applied => stats.conversion_replays += 1,
                    Ok(_) => stats.conversions += 1,
                    Err(QuestError::InsufficientBalance { .. }) => stats.conversions_rejected += 1,
                    Err(err) if err.is_retryable() => stats.conflicts += 1,
                    Err(err) => violations.push(unexpected("convert", &err)),
                }
            }
            _ => {
                let scope = if rng.random_bool(0.5) {
                    LeaderboardScope::Users
                } else {
                    LeaderboardScope::Departments
                };
                match engine.get_leaderboard(scope, Period::Daily) {
                    Ok(_) => stats.snapshots += 1,
                    Err(err) => violations.push(unexpected("leaderboard", &err)),
                }
            }
        }
    }
    (stats, violations)
}

fn claim_one(
    engine: &RewardsEngine,
    user: &UserId,
    rng: &mut StdRng,
    stats: &mut SimulatorStats,
    violations: &mut Vec<Violation>,
) {
    let instances = match engine.instances(user) {
        Ok(instances) => instances,
        Err(err) if err.is_retryable() => {
            stats.conflicts += 1;
            return;
        }
        Err(err) => {
            violations.push(unexpected("instances", &err));
            return;
        }
    };
    if instances.is_empty() {
        return;
    }

    // Mostly claimable targets, sometimes whatever comes first
    let claimable: Vec<_> = instances
        .iter()
        .filter(|i| matches!(i.status, ChallengeStatus::Completed | ChallengeStatus::Claimed))
        .collect();
    let target = if !claimable.is_empty() && rng.random_bool(0.8) {
        claimable[rng.random_range(0..claimable.len())].id
    } else {
        instances[rng.random_range(0..instances.len())].id
    };

    match engine.claim(user, target) {
        Ok(result) if result.already_claimed => stats.claim_replays += 1,
        Ok(_) => stats.claims += 1,
        Err(QuestError::InvalidState { .. }) => stats.claims_rejected += 1,
        Err(err) if err.is_retryable() => stats.conflicts += 1,
        Err(err) => violations.push(unexpected("claim", &err)),
    }
}

fn verify(
    engine: &RewardsEngine,
    floor: u64,
    stats: &SimulatorStats,
    violations: &mut Vec<Violation>,
) {
    if let Err(err) = engine.verify_ledger() {
        violations.push(Violation::Integrity {
            error: err.to_string(),
        });
    }

    let view = engine.ledger().view();
    let mut seen: HashSet<(UserId, SourceId)> = HashSet::new();
    let mut running: BTreeMap<UserId, i64> = BTreeMap::new();
    let mut claims = 0u64;
    let mut conversions = 0u64;
    let mut earned = 0u64;

    for tx in view.iter() {
        if !seen.insert((tx.user_id.clone(), tx.source_id.clone())) {
            violations.push(Violation::DuplicateSource {
                user_id: tx.user_id.clone(),
                source: tx.source_id.to_string(),
            });
        }

        let total = running.entry(tx.user_id.clone()).or_default();
        *total += tx.delta_xp;
        earned += tx.earned_xp();

        match tx.reason {
            TransactionReason::ChallengeReward => claims += 1,
            TransactionReason::CreditConversion => {
                conversions += 1;
                if *total < i64::try_from(floor).unwrap_or(i64::MAX) {
                    violations.push(Violation::FloorBreached {
                        user_id: tx.user_id.clone(),
                        sequence: tx.sequence,
                        total_xp: *total,
                    });
                }
            }
            TransactionReason::Adjustment => {}
        }
    }

    for (operation, reported, journal) in [
        ("claim", stats.claims, claims),
        ("conversion", stats.conversions, conversions),
    ] {
        if reported != journal {
            violations.push(Violation::CountMismatch {
                operation,
                reported,
                journal,
            });
        }
    }

    match engine.get_leaderboard(LeaderboardScope::Users, Period::AllTime) {
        Ok(snapshot) => {
            let actual: u64 = snapshot.entries.iter().map(|e| e.score).sum();
            if actual != earned {
                violations.push(Violation::LeaderboardMismatch {
                    expected: earned,
                    actual,
                });
            }
        }
        Err(err) => violations.push(unexpected("leaderboard", &err)),
    }
}

fn unexpected(operation: &'static str, err: &QuestError) -> Violation {
    tracing::warn!(operation, error = %err, "unexpected error during simulation");
    Violation::UnexpectedError {
        operation,
        error: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_run_passes() {
        let report = run_simulator(SimulatorConfig {
            seed: 7,
            users: 6,
            days: 4,
            operations_per_day: 300,
            threads: 3,
            reserve_floor_xp: 30,
        })
        .unwrap();

        assert!(report.passed(), "{}", report.generate_text());
        assert!(report.stats.activities > 0);
        assert_eq!(report.ledger_transactions, report.stats.claims + report.stats.conversions);
    }

    #[test]
    fn report_text_names_the_result() {
        let report = SimulatorReport {
            config: SimulatorConfig::default(),
            stats: SimulatorStats::default(),
            ledger_transactions: 0,
            violations: vec![Violation::LeaderboardMismatch {
                expected: 1,
                actual: 0,
            }],
        };
        assert!(!report.passed());
        assert!(report.generate_text().contains("Result: FAIL"));
    }
}

//! Score metrics
//!
//! A metric scores one ledger record; a participant's score is the sum of
//! its records inside the ranking window. Every built-in metric is
//! non-negative per record, so a score only grows as the window fills.

use std::fmt::Debug;
use std::sync::Arc;
use vitality_core::MetricKind;
use vitality_ledger::{LedgerTransaction, TransactionReason};

/// Per-record score contribution
pub trait ScoreMetric: Send + Sync + Debug {
    /// Metric name for logs and snapshots
    fn name(&self) -> &'static str;

    /// Contribution of one record
    fn score(&self, tx: &LedgerTransaction) -> u64;
}

/// XP earned (positive XP deltas)
#[derive(Debug, Clone, Copy, Default)]
pub struct EarnedXp;

impl ScoreMetric for EarnedXp {
    fn name(&self) -> &'static str {
        "earned_xp"
    }

    fn score(&self, tx: &LedgerTransaction) -> u64 {
        tx.earned_xp()
    }
}

/// Credits paid out by challenge rewards
#[derive(Debug, Clone, Copy, Default)]
pub struct CreditsEarned;

impl ScoreMetric for CreditsEarned {
    fn name(&self) -> &'static str {
        "credits_earned"
    }

    fn score(&self, tx: &LedgerTransaction) -> u64 {
        if tx.reason == TransactionReason::ChallengeReward {
            tx.delta_credits.max(0).unsigned_abs()
        } else {
            0
        }
    }
}

/// Challenge rewards claimed
#[derive(Debug, Clone, Copy, Default)]
pub struct ChallengesClaimed;

impl ScoreMetric for ChallengesClaimed {
    fn name(&self) -> &'static str {
        "challenges_claimed"
    }

    fn score(&self, tx: &LedgerTransaction) -> u64 {
        u64::from(tx.reason == TransactionReason::ChallengeReward)
    }
}

/// Built-in metric for a configured kind
#[must_use]
pub fn metric_for(kind: MetricKind) -> Arc<dyn ScoreMetric> {
    match kind {
        MetricKind::EarnedXp => Arc::new(EarnedXp),
        MetricKind::CreditsEarned => Arc::new(CreditsEarned),
        MetricKind::ChallengesClaimed => Arc::new(ChallengesClaimed),
    }
}

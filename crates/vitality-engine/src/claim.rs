//! Reward claim processor
//!
//! A claim pays a completed instance's reward exactly once:
//! - the instance lock is held across the ledger write and the transition
//!   to `Claimed`, so concurrent claims serialize;
//! - the ledger write is keyed by `Claim(instance_id)`, so even a lost
//!   transition can never pay twice;
//! - a claimed instance answers with its stored result and writes nothing.

use chrono::{DateTime, Utc};
use vitality_challenge::InstanceRegistry;
use vitality_core::{ChallengeId, InstanceId, QuestError, Result, UserId};
use vitality_ledger::{LedgerEntry, LedgerStore, SourceId, TransactionReason};

pub use vitality_challenge::ClaimResult;

/// A claim and what follow-up events need
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ClaimOutcome {
    pub(crate) result: ClaimResult,
    pub(crate) challenge_id: ChallengeId,
    /// Lifetime XP before and after, for a claim that paid out now
    pub(crate) lifetime_xp: Option<(u64, u64)>,
}

/// Pay out a completed instance, or return the stored result
pub(crate) fn claim_reward(
    registry: &InstanceRegistry,
    ledger: &dyn LedgerStore,
    user_id: &UserId,
    instance_id: InstanceId,
    now: DateTime<Utc>,
) -> Result<ClaimOutcome> {
    registry.with_instance(user_id, instance_id, now, |instance| {
        if let Some(stored) = instance.claim {
            return Ok(ClaimOutcome {
                result: stored.replayed(),
                challenge_id: instance.challenge_id.clone(),
                lifetime_xp: None,
            });
        }
        if !instance.is_claimable() {
            return Err(QuestError::invalid_state("claim", instance.status));
        }

        let xp = i64::try_from(instance.reward_xp)
            .map_err(|_| QuestError::invalid_argument("reward XP out of range"))?;
        let credits = i64::try_from(instance.reward_credits)
            .map_err(|_| QuestError::invalid_argument("reward credits out of range"))?;

        let outcome = ledger.apply(LedgerEntry::new(
            user_id.clone(),
            xp,
            credits,
            TransactionReason::ChallengeReward,
            SourceId::Claim(instance.id),
            now,
        ))?;

        let tx = outcome.transaction();
        let result = ClaimResult {
            xp_granted: tx.delta_xp.unsigned_abs(),
            credits_granted: tx.delta_credits.unsigned_abs(),
            already_claimed: false,
            transaction_id: tx.id,
            claimed_at: tx.timestamp,
        };
        instance.mark_claimed(result)?;

        let lifetime_xp = (!outcome.is_replay()).then(|| {
            let after = outcome.balance().lifetime_xp;
            (after - tx.earned_xp(), after)
        });

        Ok(ClaimOutcome {
            result,
            challenge_id: instance.challenge_id.clone(),
            lifetime_xp,
        })
    })
}

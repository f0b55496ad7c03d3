//! Credit conversion engine
//!
//! Converting `c` credits debits `c * xp_per_credit` XP and credits `c`
//! in one ledger transaction. The debit may not take the balance below the
//! reserve floor. Request ids make conversions idempotent per user: a
//! replayed id returns the original result, a failed request consumes
//! nothing and may be retried under the same id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vitality_core::{ConversionConfig, QuestError, RequestId, Result, TransactionId, UserId};
use vitality_ledger::{
    AccountBalance, LedgerEntry, LedgerStore, LedgerTransaction, SourceId, TransactionReason,
};

/// Fixed XP to credit ratio plus the reserve floor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionPolicy {
    /// XP debited per credit
    pub xp_per_credit: u64,
    /// XP that can never be converted
    pub reserve_floor_xp: u64,
}

impl ConversionPolicy {
    /// Policy from configuration
    #[inline]
    #[must_use]
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            xp_per_credit: config.xp_per_credit,
            reserve_floor_xp: config.reserve_floor_xp,
        }
    }

    /// XP cost of `credits`
    ///
    /// # Errors
    /// `QuestError::InvalidArgument` if the cost overflows
    pub fn xp_cost(&self, credits: u64) -> Result<u64> {
        credits
            .checked_mul(self.xp_per_credit)
            .filter(|cost| i64::try_from(*cost).is_ok())
            .ok_or_else(|| QuestError::invalid_argument("conversion cost out of range"))
    }

    /// Largest conversion the balance allows right now
    #[must_use]
    pub fn max_credits(&self, balance: &AccountBalance) -> u64 {
        balance
            .available_xp(self.reserve_floor_xp)
            .checked_div(self.xp_per_credit)
            .unwrap_or(0)
    }
}

impl Default for ConversionPolicy {
    fn default() -> Self {
        Self::from_config(&ConversionConfig::default())
    }
}

/// Result of a conversion request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    /// Caller's request id
    pub request_id: RequestId,
    /// Credits added
    pub credits_granted: u64,
    /// XP debited
    pub xp_debited: u64,
    /// True if the request id had already been applied
    pub already_applied: bool,
    /// Ledger transaction carrying the conversion
    pub transaction_id: TransactionId,
    /// When the conversion was applied
    pub applied_at: DateTime<Utc>,
    /// Account after the conversion, or current account on replay
    pub balance: AccountBalance,
}

impl ConversionResult {
    fn from_transaction(
        request_id: RequestId,
        tx: &LedgerTransaction,
        balance: AccountBalance,
        already_applied: bool,
    ) -> Self {
        Self {
            request_id,
            credits_granted: tx.delta_credits.unsigned_abs(),
            xp_debited: tx.delta_xp.unsigned_abs(),
            already_applied,
            transaction_id: tx.id,
            applied_at: tx.timestamp,
            balance,
        }
    }
}

/// Convert `credits` for `user_id` under `request_id`
///
/// # Errors
/// - `QuestError::InvalidArgument` for zero credits or an overflowing cost
/// - `QuestError::InsufficientBalance` if the debit would cross the floor
/// - `QuestError::Conflict` on lock timeout
pub(crate) fn convert_credits(
    ledger: &dyn LedgerStore,
    policy: ConversionPolicy,
    user_id: &UserId,
    credits: u64,
    request_id: RequestId,
    now: DateTime<Utc>,
) -> Result<ConversionResult> {
    if credits == 0 {
        return Err(QuestError::invalid_argument("credits must be positive"));
    }
    let cost = policy.xp_cost(credits)?;
    let source = SourceId::Conversion(request_id.clone());

    // Replays answer without re-checking the balance
    if let Some(original) = ledger.find_by_source(user_id, &source)? {
        let balance = ledger
            .balance(user_id)?
            .unwrap_or_else(|| AccountBalance::new(user_id.clone()));
        metrics::counter!("vitality_conversion_replays_total").increment(1);
        return Ok(ConversionResult::from_transaction(
            request_id, &original, balance, true,
        ));
    }

    let entry = LedgerEntry::new(
        user_id.clone(),
        -i64::try_from(cost).map_err(|_| QuestError::invalid_argument("conversion cost out of range"))?,
        i64::try_from(credits).map_err(|_| QuestError::invalid_argument("credits out of range"))?,
        TransactionReason::CreditConversion,
        source,
        now,
    )
    .with_xp_floor(policy.reserve_floor_xp);

    let outcome = ledger.apply(entry)?;
    let already_applied = outcome.is_replay();
    if already_applied {
        metrics::counter!("vitality_conversion_replays_total").increment(1);
    } else {
        metrics::counter!("vitality_conversions_total").increment(1);
        tracing::info!(
            user = %user_id,
            request = %request_id,
            credits,
            xp = cost,
            "credits converted"
        );
    }

    Ok(ConversionResult::from_transaction(
        request_id,
        outcome.transaction(),
        outcome.balance().clone(),
        already_applied,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vitality_ledger::InMemoryLedger;

    fn funded(xp: i64) -> InMemoryLedger {
        let ledger = InMemoryLedger::default();
        ledger
            .apply(LedgerEntry::new(
                UserId::from("alice"),
                xp,
                0,
                TransactionReason::Adjustment,
                SourceId::Adjustment(RequestId::from("seed")),
                DateTime::<Utc>::UNIX_EPOCH,
            ))
            .unwrap();
        ledger
    }

    fn policy(floor: u64) -> ConversionPolicy {
        ConversionPolicy {
            xp_per_credit: 10,
            reserve_floor_xp: floor,
        }
    }

    #[test]
    fn converts_within_balance() {
        let ledger = funded(250);
        let result = convert_credits(
            &ledger,
            policy(0),
            &UserId::from("alice"),
            25,
            RequestId::from("r1"),
            DateTime::<Utc>::UNIX_EPOCH,
        )
        .unwrap();

        assert_eq!(result.credits_granted, 25);
        assert_eq!(result.xp_debited, 250);
        assert!(!result.already_applied);
        assert_eq!(result.balance.total_xp, 0);
        assert_eq!(result.balance.lifetime_xp, 250);
        assert_eq!(result.balance.credits, 25);
    }

    #[test]
    fn floor_limits_conversion() {
        let ledger = funded(250);
        let err = convert_credits(
            &ledger,
            policy(100),
            &UserId::from("alice"),
            16,
            RequestId::from("r1"),
            DateTime::<Utc>::UNIX_EPOCH,
        )
        .unwrap_err();
        assert_eq!(
            err,
            QuestError::InsufficientBalance {
                required: 160,
                available: 150
            }
        );
    }

    #[test]
    fn zero_credits_rejected() {
        let ledger = funded(250);
        let err = convert_credits(
            &ledger,
            policy(0),
            &UserId::from("alice"),
            0,
            RequestId::from("r1"),
            DateTime::<Utc>::UNIX_EPOCH,
        )
        .unwrap_err();
        assert!(matches!(err, QuestError::InvalidArgument(_)));
        assert_eq!(ledger.view().len(), 1);
    }

    #[test]
    fn max_credits_respects_floor() {
        let mut balance = AccountBalance::new(UserId::from("alice"));
        balance.total_xp = 255;
        assert_eq!(policy(0).max_credits(&balance), 25);
        assert_eq!(policy(100).max_credits(&balance), 15);
        assert_eq!(policy(300).max_credits(&balance), 0);
    }

    #[test]
    fn overflowing_cost_rejected() {
        assert!(policy(0).xp_cost(u64::MAX).is_err());
        assert_eq!(policy(0).xp_cost(3).unwrap(), 30);
    }
}

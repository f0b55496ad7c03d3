//! Per-user balances

use crate::journal::LedgerEntry;
use serde::{Deserialize, Serialize};
use vitality_core::{QuestError, Result, UserId};

/// Balances derived from a user's journal records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Account owner
    pub user_id: UserId,
    /// Banked XP: sum of all XP deltas
    pub total_xp: u64,
    /// Sum of positive XP deltas; never decreases
    pub lifetime_xp: u64,
    /// Sum of all credit deltas
    pub credits: u64,
    /// Number of records applied to this account
    pub version: u64,
}

impl AccountBalance {
    /// Empty account
    #[inline]
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            total_xp: 0,
            lifetime_xp: 0,
            credits: 0,
            version: 0,
        }
    }

    /// XP available for debits above `floor`
    #[inline]
    #[must_use]
    pub fn available_xp(&self, floor: u64) -> u64 {
        self.total_xp.saturating_sub(floor)
    }

    /// Balance after applying `entry`, without mutating `self`
    ///
    /// # Errors
    /// - `QuestError::InsufficientBalance` if an XP debit would cross the floor
    /// - `QuestError::InvalidArgument` on negative credits or overflow
    pub fn preview(&self, entry: &LedgerEntry) -> Result<Self> {
        let total_xp = if entry.delta_xp < 0 {
            let required = entry.delta_xp.unsigned_abs();
            let available = self.available_xp(entry.xp_floor);
            if required > available {
                return Err(QuestError::InsufficientBalance {
                    required,
                    available,
                });
            }
            self.total_xp - required
        } else {
            self.total_xp
                .checked_add(entry.delta_xp.unsigned_abs())
                .ok_or_else(|| QuestError::invalid_argument("XP balance overflow"))?
        };

        let lifetime_xp = self
            .lifetime_xp
            .checked_add(entry.delta_xp.max(0).unsigned_abs())
            .ok_or_else(|| QuestError::invalid_argument("lifetime XP overflow"))?;

        let credits = if entry.delta_credits < 0 {
            self.credits
                .checked_sub(entry.delta_credits.unsigned_abs())
                .ok_or_else(|| QuestError::invalid_argument("credit balance would go negative"))?
        } else {
            self.credits
                .checked_add(entry.delta_credits.unsigned_abs())
                .ok_or_else(|| QuestError::invalid_argument("credit balance overflow"))?
        };

        Ok(Self {
            user_id: self.user_id.clone(),
            total_xp,
            lifetime_xp,
            credits,
            version: self.version + 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{SourceId, TransactionReason};
    use chrono::{DateTime, Utc};
    use vitality_core::RequestId;

    fn entry(xp: i64, credits: i64) -> LedgerEntry {
        LedgerEntry::new(
            UserId::from("a"),
            xp,
            credits,
            TransactionReason::Adjustment,
            SourceId::Adjustment(RequestId::from("k")),
            DateTime::<Utc>::UNIX_EPOCH,
        )
    }

    #[test]
    fn credit_then_debit() {
        let account = AccountBalance::new(UserId::from("a"));
        let account = account.preview(&entry(250, 0)).unwrap();
        let account = account.preview(&entry(-250, 25)).unwrap();

        assert_eq!(account.total_xp, 0);
        assert_eq!(account.lifetime_xp, 250);
        assert_eq!(account.credits, 25);
        assert_eq!(account.version, 2);
    }

    #[test]
    fn debit_respects_floor() {
        let account = AccountBalance::new(UserId::from("a"))
            .preview(&entry(250, 0))
            .unwrap();

        let err = account
            .preview(&entry(-200, 20).with_xp_floor(100))
            .unwrap_err();
        assert_eq!(
            err,
            QuestError::InsufficientBalance {
                required: 200,
                available: 150
            }
        );
        assert!(account.preview(&entry(-150, 15).with_xp_floor(100)).is_ok());
    }

    #[test]
    fn credits_cannot_go_negative() {
        let account = AccountBalance::new(UserId::from("a"));
        assert!(matches!(
            account.preview(&entry(0, -1)),
            Err(QuestError::InvalidArgument(_))
        ));
    }
}

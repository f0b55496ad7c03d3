//! Ledger store
//!
//! [`InMemoryLedger`] serializes writes per user: each account sits behind
//! its own mutex, acquired with a bounded wait. The idempotency index lives
//! inside the account, so the replay check, the balance check and the
//! journal append happen under one lock.
//!
//! Lock order is always account, then journal.

use crate::account::AccountBalance;
use crate::journal::{Journal, LedgerEntry, LedgerTransaction, LedgerView, SourceId};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use vitality_core::{QuestError, Result, UserId};

/// Result of [`LedgerStore::apply`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Newly written
    Applied {
        /// The new record
        transaction: LedgerTransaction,
        /// Account balance right after the write
        balance: AccountBalance,
    },
    /// The source was already applied; nothing was written
    Replayed {
        /// The original record
        transaction: LedgerTransaction,
        /// Current account balance
        balance: AccountBalance,
    },
}

impl ApplyOutcome {
    /// The transaction, new or original
    #[inline]
    #[must_use]
    pub fn transaction(&self) -> &LedgerTransaction {
        match self {
            Self::Applied { transaction, .. } | Self::Replayed { transaction, .. } => transaction,
        }
    }

    /// Account balance as of the outcome
    #[inline]
    #[must_use]
    pub fn balance(&self) -> &AccountBalance {
        match self {
            Self::Applied { balance, .. } | Self::Replayed { balance, .. } => balance,
        }
    }

    /// Whether nothing new was written
    #[inline]
    #[must_use]
    pub fn is_replay(&self) -> bool {
        matches!(self, Self::Replayed { .. })
    }
}

/// Outcome of [`LedgerStore::verify_integrity`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntegrityReport {
    /// Journal records whose chain was verified
    pub transactions_checked: u64,
    /// Accounts whose balances matched the journal
    pub accounts_checked: u64,
    /// Accounts written to after the view was taken
    pub accounts_skipped: u64,
}

/// Keyed XP/credit storage with an append-only journal
pub trait LedgerStore: Send + Sync + Debug {
    /// Apply an entry at most once per `(user_id, source_id)`
    ///
    /// # Errors
    /// - `QuestError::InsufficientBalance` if a debit exceeds the available XP
    /// - `QuestError::Conflict` if the account lock is contended past the timeout
    fn apply(&self, entry: LedgerEntry) -> Result<ApplyOutcome>;

    /// Current balance; `None` for a user without records
    ///
    /// # Errors
    /// `QuestError::Conflict` on lock timeout
    fn balance(&self, user_id: &UserId) -> Result<Option<AccountBalance>>;

    /// Transaction previously applied for a source
    ///
    /// # Errors
    /// `QuestError::Conflict` on lock timeout
    fn find_by_source(
        &self,
        user_id: &UserId,
        source_id: &SourceId,
    ) -> Result<Option<LedgerTransaction>>;

    /// Point-in-time copy of the journal
    fn view(&self) -> LedgerView;

    /// Verify the hash chain and that balances equal the journal sums
    ///
    /// # Errors
    /// `QuestError::Integrity` naming the first offending sequence
    fn verify_integrity(&self) -> Result<IntegrityReport>;
}

#[derive(Debug)]
struct AccountState {
    balance: AccountBalance,
    by_source: HashMap<SourceId, LedgerTransaction>,
}

/// In-process ledger
#[derive(Debug)]
pub struct InMemoryLedger {
    accounts: DashMap<UserId, Arc<Mutex<AccountState>>>,
    journal: RwLock<Journal>,
    lock_timeout: Duration,
}

impl InMemoryLedger {
    /// Create ledger with the given per-account lock timeout
    #[inline]
    #[must_use]
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            accounts: DashMap::new(),
            journal: RwLock::new(Journal::new()),
            lock_timeout,
        }
    }

    /// Number of accounts with at least one record
    #[inline]
    #[must_use]
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    fn account(&self, user_id: &UserId) -> Arc<Mutex<AccountState>> {
        self.accounts
            .entry(user_id.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(AccountState {
                    balance: AccountBalance::new(user_id.clone()),
                    by_source: HashMap::new(),
                }))
            })
            .clone()
    }

    fn existing(&self, user_id: &UserId) -> Option<Arc<Mutex<AccountState>>> {
        self.accounts.get(user_id).map(|entry| entry.value().clone())
    }

    fn timeout(&self, user_id: &UserId) -> QuestError {
        tracing::warn!(user = %user_id, "ledger account lock timed out");
        QuestError::conflict(format!("account:{user_id}"), "lock wait timed out")
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

impl LedgerStore for InMemoryLedger {
    fn apply(&self, entry: LedgerEntry) -> Result<ApplyOutcome> {
        let account = self.account(&entry.user_id);
        let mut state = account
            .try_lock_for(self.lock_timeout)
            .ok_or_else(|| self.timeout(&entry.user_id))?;

        if let Some(original) = state.by_source.get(&entry.source_id) {
            tracing::debug!(
                user = %entry.user_id,
                source = %entry.source_id,
                "ledger source already applied"
            );
            return Ok(ApplyOutcome::Replayed {
                transaction: original.clone(),
                balance: state.balance.clone(),
            });
        }

        let balance = state.balance.preview(&entry)?;
        let tx = self.journal.write().append(&entry);

        state.by_source.insert(entry.source_id, tx.clone());
        state.balance = balance.clone();

        tracing::debug!(
            user = %tx.user_id,
            sequence = tx.sequence,
            delta_xp = tx.delta_xp,
            delta_credits = tx.delta_credits,
            "ledger transaction applied"
        );
        Ok(ApplyOutcome::Applied {
            transaction: tx,
            balance,
        })
    }

    fn balance(&self, user_id: &UserId) -> Result<Option<AccountBalance>> {
        let Some(account) = self.existing(user_id) else {
            return Ok(None);
        };
        let state = account
            .try_lock_for(self.lock_timeout)
            .ok_or_else(|| self.timeout(user_id))?;
        Ok(Some(state.balance.clone()))
    }

    fn find_by_source(
        &self,
        user_id: &UserId,
        source_id: &SourceId,
    ) -> Result<Option<LedgerTransaction>> {
        let Some(account) = self.existing(user_id) else {
            return Ok(None);
        };
        let state = account
            .try_lock_for(self.lock_timeout)
            .ok_or_else(|| self.timeout(user_id))?;
        Ok(state.by_source.get(source_id).cloned())
    }

    fn view(&self) -> LedgerView {
        self.journal.read().view()
    }

    fn verify_integrity(&self) -> Result<IntegrityReport> {
        let view = self.view();
        view.verify_chain()
            .map_err(|(sequence, reason)| QuestError::Integrity {
                sequence,
                reason: reason.to_string(),
            })?;

        let mut expected: BTreeMap<UserId, AccountBalance> = BTreeMap::new();
        for tx in view.iter() {
            let account = expected
                .entry(tx.user_id.clone())
                .or_insert_with(|| AccountBalance::new(tx.user_id.clone()));
            // Plain sums: floors were enforced when each record was applied.
            account.total_xp = account.total_xp.wrapping_add_signed(tx.delta_xp);
            account.lifetime_xp += tx.earned_xp();
            account.credits = account.credits.wrapping_add_signed(tx.delta_credits);
            account.version += 1;
        }

        let mut report = IntegrityReport {
            transactions_checked: view.version(),
            ..IntegrityReport::default()
        };

        for (user_id, want) in &expected {
            let Some(have) = self.balance(user_id)? else {
                return Err(QuestError::Integrity {
                    sequence: view.version(),
                    reason: format!("journal records for unknown account {user_id}"),
                });
            };
            if have.version != want.version {
                report.accounts_skipped += 1;
                continue;
            }
            if have.total_xp != want.total_xp
                || have.lifetime_xp != want.lifetime_xp
                || have.credits != want.credits
            {
                return Err(QuestError::Integrity {
                    sequence: view.version(),
                    reason: format!("balance of {user_id} differs from journal sum"),
                });
            }
            report.accounts_checked += 1;
        }

        Ok(report)
    }
}

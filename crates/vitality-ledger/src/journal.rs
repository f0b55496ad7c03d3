//! Hash-chained transaction journal
//!
//! Every applied transaction is appended once, stamped with a global
//! sequence number and chained to its predecessor with SHA-256 so any later
//! edit of the log is detectable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use vitality_core::{InstanceId, RequestId, TransactionId, UserId};

/// Natural idempotency key of a transaction, scoped per user
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// Reward for a claimed challenge instance
    Claim(InstanceId),
    /// XP to credit conversion request
    Conversion(RequestId),
    /// Operator grant or correction
    Adjustment(RequestId),
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Claim(id) => write!(f, "claim:{id}"),
            Self::Conversion(id) => write!(f, "conversion:{id}"),
            Self::Adjustment(id) => write!(f, "adjustment:{id}"),
        }
    }
}

/// Why a transaction exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionReason {
    /// Challenge reward
    ChallengeReward,
    /// XP debited for credits
    CreditConversion,
    /// Operator grant
    Adjustment,
}

impl TransactionReason {
    #[inline]
    fn tag(self) -> u8 {
        match self {
            Self::ChallengeReward => 1,
            Self::CreditConversion => 2,
            Self::Adjustment => 3,
        }
    }
}

/// A transaction to be applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Account owner
    pub user_id: UserId,
    /// XP change
    pub delta_xp: i64,
    /// Credit change
    pub delta_credits: i64,
    /// Why
    pub reason: TransactionReason,
    /// Idempotency key
    pub source_id: SourceId,
    /// Business time of the change
    pub timestamp: DateTime<Utc>,
    /// XP that must remain after a debit
    pub xp_floor: u64,
}

impl LedgerEntry {
    /// Create new entry with no XP floor
    #[inline]
    #[must_use]
    pub fn new(
        user_id: UserId,
        delta_xp: i64,
        delta_credits: i64,
        reason: TransactionReason,
        source_id: SourceId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            delta_xp,
            delta_credits,
            reason,
            source_id,
            timestamp,
            xp_floor: 0,
        }
    }

    /// Require `floor` XP to remain after the debit
    #[inline]
    #[must_use]
    pub fn with_xp_floor(mut self, floor: u64) -> Self {
        self.xp_floor = floor;
        self
    }
}

/// An applied, immutable journal record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Transaction id
    pub id: TransactionId,
    /// Global position in the journal, from 0
    pub sequence: u64,
    /// Account owner
    pub user_id: UserId,
    /// XP change
    pub delta_xp: i64,
    /// Credit change
    pub delta_credits: i64,
    /// Why
    pub reason: TransactionReason,
    /// Idempotency key
    pub source_id: SourceId,
    /// Business time of the change
    pub timestamp: DateTime<Utc>,
    /// Hash of the previous record (zero for the first)
    pub prev_hash: [u8; 32],
    /// Hash of this record
    pub hash: [u8; 32],
}

impl LedgerTransaction {
    /// Hex-encoded record hash
    #[must_use]
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// XP earned by this record (debits count as zero)
    #[inline]
    #[must_use]
    pub fn earned_xp(&self) -> u64 {
        self.delta_xp.max(0).unsigned_abs()
    }
}

/// Append-only journal
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: im::Vector<LedgerTransaction>,
    head: [u8; 32],
}

impl Journal {
    /// Create empty journal
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, returning the sealed record
    pub fn append(&mut self, entry: &LedgerEntry) -> LedgerTransaction {
        let mut tx = LedgerTransaction {
            id: TransactionId::new(),
            sequence: self.entries.len() as u64,
            user_id: entry.user_id.clone(),
            delta_xp: entry.delta_xp,
            delta_credits: entry.delta_credits,
            reason: entry.reason,
            source_id: entry.source_id.clone(),
            timestamp: entry.timestamp,
            prev_hash: self.head,
            hash: [0u8; 32],
        };
        tx.hash = compute_hash(&tx);
        self.head = tx.hash;
        self.entries.push_back(tx.clone());
        tx
    }

    /// Number of records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the journal is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// O(1) immutable copy
    #[inline]
    #[must_use]
    pub fn view(&self) -> LedgerView {
        LedgerView {
            version: self.entries.len() as u64,
            entries: self.entries.clone(),
        }
    }
}

/// Point-in-time copy of the journal
///
/// Later writes never show up in an existing view.
#[derive(Debug, Clone, Default)]
pub struct LedgerView {
    version: u64,
    entries: im::Vector<LedgerTransaction>,
}

impl LedgerView {
    /// Journal length when the view was taken
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// All records in sequence order
    pub fn iter(&self) -> impl Iterator<Item = &LedgerTransaction> {
        self.entries.iter()
    }

    /// Records of one user in sequence order
    pub fn for_user<'a>(
        &'a self,
        user_id: &'a UserId,
    ) -> impl Iterator<Item = &'a LedgerTransaction> + 'a {
        self.entries.iter().filter(move |tx| &tx.user_id == user_id)
    }

    /// Number of records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the view is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check the hash chain
    ///
    /// # Errors
    /// Returns the sequence of the first record whose link or hash is wrong
    pub fn verify_chain(&self) -> Result<(), (u64, &'static str)> {
        let mut prev = [0u8; 32];
        for tx in &self.entries {
            if tx.prev_hash != prev {
                return Err((tx.sequence, "broken link"));
            }
            if tx.hash != compute_hash(tx) {
                return Err((tx.sequence, "hash mismatch"));
            }
            prev = tx.hash;
        }
        Ok(())
    }
}

fn compute_hash(tx: &LedgerTransaction) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(tx.id.0.to_bytes());
    hasher.update(tx.sequence.to_le_bytes());
    hasher.update(tx.user_id.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(tx.delta_xp.to_le_bytes());
    hasher.update(tx.delta_credits.to_le_bytes());
    hasher.update([tx.reason.tag()]);
    hasher.update(tx.source_id.to_string().as_bytes());
    hasher.update([0]);
    hasher.update(tx.timestamp.timestamp_millis().to_le_bytes());
    hasher.update(tx.prev_hash);
    hasher.finalize().into()
}

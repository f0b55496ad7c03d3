//! Vitality Ledger
//!
//! Durable keyed storage for per-user XP and credit balances, backed by an
//! append-only transaction journal.
//!
//! # Guarantees
//!
//! - A user's `total_xp` and `credits` always equal the sum of that user's
//!   journal deltas.
//! - A [`SourceId`] is applied at most once per user; repeats return the
//!   original [`LedgerTransaction`] as [`ApplyOutcome::Replayed`].
//! - Writes are serialized per user; a write either lands completely or
//!   not at all.
//! - [`LedgerStore::view`] yields an immutable, versioned point-in-time copy
//!   of the journal for readers such as the leaderboard.
//!
//! # Example
//!
//! ```rust
//! use vitality_core::{RequestId, UserId};
//! use vitality_ledger::{InMemoryLedger, LedgerEntry, LedgerStore, SourceId, TransactionReason};
//!
//! let ledger = InMemoryLedger::default();
//! let alice = UserId::from("alice");
//! let entry = LedgerEntry::new(
//!     alice.clone(),
//!     250,
//!     0,
//!     TransactionReason::Adjustment,
//!     SourceId::Adjustment(RequestId::from("welcome-bonus")),
//!     chrono::Utc::now(),
//! );
//!
//! assert!(!ledger.apply(entry.clone()).unwrap().is_replay());
//! assert!(ledger.apply(entry).unwrap().is_replay());
//! assert_eq!(ledger.balance(&alice).unwrap().unwrap().total_xp, 250);
//! ```

#![warn(missing_docs)]

pub mod account;
pub mod journal;
pub mod store;

// Re-exports
pub use account::AccountBalance;
pub use journal::{Journal, LedgerEntry, LedgerTransaction, LedgerView, SourceId, TransactionReason};
pub use store::{ApplyOutcome, InMemoryLedger, IntegrityReport, LedgerStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

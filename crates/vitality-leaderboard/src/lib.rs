//! Vitality Leaderboard
//!
//! Orders users, departments or teams by a score metric over a time
//! window, with rank deltas against the previous snapshot.
//!
//! - [`Ranker`]: pure ranking over a [`vitality_ledger::LedgerView`]
//! - [`ScoreMetric`]: per-record scoring ([`EarnedXp`], [`CreditsEarned`],
//!   [`ChallengesClaimed`])
//! - [`SnapshotStore`]: the two most recent snapshots per scope and period
//! - [`Roster`]: department and team membership

#![warn(missing_docs)]

pub mod metric;
pub mod ranker;
pub mod roster;
pub mod snapshot;

// Re-exports
pub use metric::{metric_for, ChallengesClaimed, CreditsEarned, EarnedXp, ScoreMetric};
pub use ranker::{PeriodWindow, Ranker};
pub use roster::Roster;
pub use snapshot::{
    LeaderboardEntry, LeaderboardSnapshot, RankChange, SnapshotStore, RETAINED_SNAPSHOTS,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

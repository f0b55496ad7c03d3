//! Leaderboard snapshots
//!
//! A snapshot is the ranking of one `(scope, period)` over one ledger view.
//! [`SnapshotStore`] keeps the two most recent per `(scope, period)`; the
//! newer one is the baseline for the next ranking's rank deltas.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use vitality_core::{LeaderboardScope, Period, RankedEntity};

/// Snapshots retained per `(scope, period)`
pub const RETAINED_SNAPSHOTS: usize = 2;

/// One ranked participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// Participant
    pub entity: RankedEntity,
    /// Score in the window
    pub score: u64,
    /// 1-based position, unique within the snapshot
    pub rank: u32,
    /// `previous rank - rank`; positive means moved up, 0 when new
    pub rank_delta: i64,
    /// When the score was reached; `None` for a zero score
    pub reached_at: Option<DateTime<Utc>>,
}

/// Ranking of one scope over one window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardSnapshot {
    /// What was ranked
    pub scope: LeaderboardScope,
    /// Period kind
    pub period: Period,
    /// Inclusive window start; `None` for all time
    pub window_start: Option<DateTime<Utc>>,
    /// Exclusive window end
    pub window_end: DateTime<Utc>,
    /// When the ranking ran
    pub generated_at: DateTime<Utc>,
    /// Ledger version the ranking read
    pub ledger_version: u64,
    /// Metric name
    pub metric: String,
    /// Entries in rank order
    pub entries: Vec<LeaderboardEntry>,
}

/// Rank movement of one participant between two snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankChange {
    /// Participant
    pub entity: RankedEntity,
    /// Rank in the older snapshot
    pub previous_rank: u32,
    /// Rank in the newer snapshot
    pub rank: u32,
}

impl LeaderboardSnapshot {
    /// Entry of a participant
    #[must_use]
    pub fn entry(&self, entity: &RankedEntity) -> Option<&LeaderboardEntry> {
        self.entries.iter().find(|entry| &entry.entity == entity)
    }

    /// Rank of a participant
    #[must_use]
    pub fn rank_of(&self, entity: &RankedEntity) -> Option<u32> {
        self.entry(entity).map(|entry| entry.rank)
    }

    /// Top `n` entries
    #[must_use]
    pub fn top(&self, n: usize) -> &[LeaderboardEntry] {
        &self.entries[..n.min(self.entries.len())]
    }

    /// Participants whose rank differs from `previous`
    #[must_use]
    pub fn changes_since(&self, previous: &Self) -> Vec<RankChange> {
        let before: HashMap<&RankedEntity, u32> = previous
            .entries
            .iter()
            .map(|entry| (&entry.entity, entry.rank))
            .collect();

        self.entries
            .iter()
            .filter_map(|entry| {
                let previous_rank = *before.get(&entry.entity)?;
                (previous_rank != entry.rank).then(|| RankChange {
                    entity: entry.entity.clone(),
                    previous_rank,
                    rank: entry.rank,
                })
            })
            .collect()
    }
}

/// Recent snapshots per `(scope, period)`
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: DashMap<(LeaderboardScope, Period), VecDeque<Arc<LeaderboardSnapshot>>>,
}

impl SnapshotStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent snapshot
    #[must_use]
    pub fn latest(&self, scope: &LeaderboardScope, period: Period) -> Option<Arc<LeaderboardSnapshot>> {
        self.snapshots
            .get(&(scope.clone(), period))
            .and_then(|entry| entry.back().cloned())
    }

    /// Store a snapshot, evicting beyond [`RETAINED_SNAPSHOTS`]
    ///
    /// Returns the snapshot it displaced as latest.
    pub fn push(&self, snapshot: Arc<LeaderboardSnapshot>) -> Option<Arc<LeaderboardSnapshot>> {
        let mut retained = self
            .snapshots
            .entry((snapshot.scope.clone(), snapshot.period))
            .or_default();
        let previous = retained.back().cloned();
        retained.push_back(snapshot);
        while retained.len() > RETAINED_SNAPSHOTS {
            retained.pop_front();
        }
        previous
    }

    /// Retained snapshots, oldest first
    #[must_use]
    pub fn retained(&self, scope: &LeaderboardScope, period: Period) -> Vec<Arc<LeaderboardSnapshot>> {
        self.snapshots
            .get(&(scope.clone(), period))
            .map(|entry| entry.iter().cloned().collect())
            .unwrap_or_default()
    }
}

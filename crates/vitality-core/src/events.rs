//! Advisory events for the notification layer
//!
//! Engine correctness never depends on anyone consuming these.

use crate::types::{ChallengeId, InstanceId, LeaderboardScope, Period, RankedEntity, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event emitted after a committed state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// An instance reached its target
    ChallengeCompleted {
        /// Owner
        user_id: UserId,
        /// Completed instance
        instance_id: InstanceId,
        /// Template
        challenge_id: ChallengeId,
        /// Completion time
        at: DateTime<Utc>,
    },
    /// A reward was granted (first claim only)
    RewardClaimed {
        /// Owner
        user_id: UserId,
        /// Claimed instance
        instance_id: InstanceId,
        /// XP granted
        xp_granted: u64,
        /// Credits granted
        credits_granted: u64,
        /// Claim time
        at: DateTime<Utc>,
    },
    /// Lifetime XP crossed one or more level thresholds
    LevelUp {
        /// User
        user_id: UserId,
        /// Level before the grant
        from_level: u32,
        /// Level after the grant
        to_level: u32,
        /// Time of the grant
        at: DateTime<Utc>,
    },
    /// An entity moved between two snapshots of the same leaderboard
    RankChanged {
        /// Leaderboard scope
        scope: LeaderboardScope,
        /// Leaderboard period
        period: Period,
        /// Entity that moved
        entity: RankedEntity,
        /// Rank in the previous snapshot
        previous_rank: u32,
        /// Rank in the new snapshot
        rank: u32,
    },
}

impl EngineEvent {
    /// Short event name for logs and metrics labels
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChallengeCompleted { .. } => "challenge_completed",
            Self::RewardClaimed { .. } => "reward_claimed",
            Self::LevelUp { .. } => "level_up",
            Self::RankChanged { .. } => "rank_changed",
        }
    }
}

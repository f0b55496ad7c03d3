//! XP to level calculator
//!
//! Levels follow a configured step function: level `n` needs cumulative XP
//! of at least `threshold(n)`, with `threshold(1) = 0`.

use serde::{Deserialize, Serialize};
use vitality_core::{LevelConfig, QuestError, Result};

/// Where a user stands within the level curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelProgress {
    /// Current level, from 1
    pub level: u32,
    /// XP earned since reaching `level`
    pub xp_into_level: u64,
    /// XP still needed for the next level; 0 at the top level
    pub xp_to_next_level: u64,
    /// The XP this was computed from
    pub total_xp: u64,
}

impl LevelProgress {
    /// Whether no higher level exists
    #[inline]
    #[must_use]
    pub fn is_max_level(&self) -> bool {
        self.xp_to_next_level == 0
    }

    /// Fraction of the current level completed, in `[0, 1]`
    #[must_use]
    pub fn fraction(&self) -> f64 {
        let span = self.xp_into_level + self.xp_to_next_level;
        if span == 0 {
            1.0
        } else {
            self.xp_into_level as f64 / span as f64
        }
    }
}

/// Validated threshold table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelTable {
    thresholds: Vec<u64>,
}

impl LevelTable {
    /// Build from configuration
    ///
    /// # Errors
    /// `QuestError::Config` if the table is empty, does not start at 0, or
    /// is not strictly increasing
    pub fn from_config(config: &LevelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            thresholds: config.thresholds.clone(),
        })
    }

    /// Build from raw thresholds
    ///
    /// # Errors
    /// Same as [`LevelTable::from_config`]
    pub fn new(thresholds: Vec<u64>) -> Result<Self> {
        Self::from_config(&LevelConfig { thresholds })
    }

    /// Level and progress for signed XP input
    ///
    /// # Errors
    /// `QuestError::InvalidArgument` if `total_xp` is negative
    pub fn level_of(&self, total_xp: i64) -> Result<LevelProgress> {
        let xp = u64::try_from(total_xp).map_err(|_| {
            QuestError::invalid_argument(format!("total XP must be non-negative, got {total_xp}"))
        })?;
        Ok(self.progress(xp))
    }

    /// Level and progress for XP
    #[must_use]
    pub fn progress(&self, total_xp: u64) -> LevelProgress {
        // thresholds[0] == 0, so at least one threshold is always reached
        let reached = self.thresholds.partition_point(|&t| t <= total_xp).max(1);
        let floor = self.thresholds[reached - 1];
        let xp_to_next_level = self
            .thresholds
            .get(reached)
            .map_or(0, |&next| next - total_xp);

        LevelProgress {
            level: u32::try_from(reached).unwrap_or(u32::MAX),
            xp_into_level: total_xp - floor,
            xp_to_next_level,
            total_xp,
        }
    }

    /// Cumulative XP needed for `level`
    #[must_use]
    pub fn threshold(&self, level: u32) -> Option<u64> {
        let index = usize::try_from(level).ok()?.checked_sub(1)?;
        self.thresholds.get(index).copied()
    }

    /// Highest level
    #[inline]
    #[must_use]
    pub fn max_level(&self) -> u32 {
        u32::try_from(self.thresholds.len()).unwrap_or(u32::MAX)
    }

    /// `(from, to)` when going from `before` to `after` XP crosses a threshold
    #[must_use]
    pub fn level_change(&self, before: u64, after: u64) -> Option<(u32, u32)> {
        let from = self.progress(before).level;
        let to = self.progress(after).level;
        (to != from).then_some((from, to))
    }

    /// Iterate `(level, threshold)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (u32, u64)> + '_ {
        (1u32..).zip(self.thresholds.iter().copied())
    }
}

impl Default for LevelTable {
    fn default() -> Self {
        Self {
            thresholds: LevelConfig::default().thresholds,
        }
    }
}

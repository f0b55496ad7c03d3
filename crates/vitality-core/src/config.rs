//! Engine configuration
//!
//! Every tunable the operators own lives here so progression can be
//! retuned without code changes:
//! - Level threshold table
//! - XP per credit and the conversion reserve floor
//! - Day-boundary timezone policy and qualifying activities for streaks
//! - Challenge window definitions (week start, claim grace)
//! - Leaderboard metric, aggregation and tie-break key
//! - Per-key lock timeout

use crate::error::{QuestError, Result};
use crate::types::ActivityKind;
use chrono::{FixedOffset, Offset, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Longest accepted claim grace (one year)
const MAX_CLAIM_GRACE_SECS: u64 = 365 * 24 * 60 * 60;

/// Offsets must stay strictly inside one day
const MAX_OFFSET_MINUTES: i32 = 24 * 60 - 1;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Level thresholds
    pub levels: LevelConfig,
    /// XP to credit conversion
    pub conversion: ConversionConfig,
    /// Streak rules and day boundaries
    pub streaks: StreakConfig,
    /// Challenge windows
    pub challenges: ChallengeConfig,
    /// Leaderboard ranking
    pub leaderboard: LeaderboardConfig,
    /// Lock behaviour
    pub concurrency: ConcurrencyConfig,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// `QuestError::Config` on parse or validation failure
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| QuestError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a YAML document
    ///
    /// # Errors
    /// `QuestError::Config` on parse or validation failure
    pub fn from_yaml_str(source: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(source).map_err(|e| QuestError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.toml`, `.yaml` or `.yml` file
    ///
    /// # Errors
    /// `QuestError::Config` if the file cannot be read, has an unknown
    /// extension, or does not validate
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| QuestError::Config(format!("{}: {e}", path.display())))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&source),
            Some("yaml" | "yml") => Self::from_yaml_str(&source),
            _ => Err(QuestError::Config(format!(
                "{}: unsupported configuration format",
                path.display()
            ))),
        }
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    /// `QuestError::Config` naming the first violated constraint
    pub fn validate(&self) -> Result<()> {
        self.levels.validate()?;

        if self.conversion.xp_per_credit == 0 {
            return Err(QuestError::Config(
                "conversion.xp_per_credit must be positive".into(),
            ));
        }

        self.streaks.timezone.validate()?;

        if self.challenges.claim_grace_secs > MAX_CLAIM_GRACE_SECS {
            return Err(QuestError::Config(format!(
                "challenges.claim_grace_secs exceeds {MAX_CLAIM_GRACE_SECS}"
            )));
        }

        if self.concurrency.lock_timeout_ms == 0 {
            return Err(QuestError::Config(
                "concurrency.lock_timeout_ms must be positive".into(),
            ));
        }

        Ok(())
    }

    /// With level thresholds
    #[inline]
    #[must_use]
    pub fn with_level_thresholds(mut self, thresholds: Vec<u64>) -> Self {
        self.levels.thresholds = thresholds;
        self
    }

    /// With XP per credit
    #[inline]
    #[must_use]
    pub fn with_xp_per_credit(mut self, ratio: u64) -> Self {
        self.conversion.xp_per_credit = ratio;
        self
    }

    /// With conversion reserve floor
    #[inline]
    #[must_use]
    pub fn with_reserve_floor_xp(mut self, floor: u64) -> Self {
        self.conversion.reserve_floor_xp = floor;
        self
    }

    /// With timezone policy
    #[inline]
    #[must_use]
    pub fn with_timezone(mut self, timezone: TimezonePolicy) -> Self {
        self.streaks.timezone = timezone;
        self
    }

    /// With qualifying streak activities (empty means all)
    #[inline]
    #[must_use]
    pub fn with_qualifying_kinds(mut self, kinds: Vec<ActivityKind>) -> Self {
        self.streaks.qualifying_kinds = kinds;
        self
    }

    /// With claim grace after a window closes
    #[inline]
    #[must_use]
    pub fn with_claim_grace_secs(mut self, secs: u64) -> Self {
        self.challenges.claim_grace_secs = secs;
        self
    }

    /// With first day of the week
    #[inline]
    #[must_use]
    pub fn with_week_start(mut self, start: WeekStart) -> Self {
        self.challenges.week_starts_on = start;
        self
    }

    /// With leaderboard tie-break
    #[inline]
    #[must_use]
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.leaderboard.tie_break = tie_break;
        self
    }

    /// With leaderboard metric
    #[inline]
    #[must_use]
    pub fn with_metric(mut self, metric: MetricKind) -> Self {
        self.leaderboard.metric = metric;
        self
    }

    /// With unit aggregation
    #[inline]
    #[must_use]
    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.leaderboard.aggregation = aggregation;
        self
    }

    /// With lock timeout
    #[inline]
    #[must_use]
    pub fn with_lock_timeout_ms(mut self, ms: u64) -> Self {
        self.concurrency.lock_timeout_ms = ms;
        self
    }
}

/// Cumulative XP required for each level, level 1 first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    /// `thresholds[n - 1]` is the XP needed for level `n`
    pub thresholds: Vec<u64>,
}

impl LevelConfig {
    /// Check the table starts at 0 and strictly increases
    ///
    /// # Errors
    /// `QuestError::Config` describing the first violation
    pub fn validate(&self) -> Result<()> {
        match self.thresholds.first() {
            None => return Err(QuestError::Config("levels.thresholds is empty".into())),
            Some(&first) if first != 0 => {
                return Err(QuestError::Config(
                    "levels.thresholds must start at 0".into(),
                ))
            }
            Some(_) => {}
        }

        if let Some(pos) = self.thresholds.windows(2).position(|w| w[0] >= w[1]) {
            return Err(QuestError::Config(format!(
                "levels.thresholds must be strictly increasing (level {})",
                pos + 2
            )));
        }

        Ok(())
    }
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            thresholds: vec![0, 100, 250, 500, 1_000, 1_750, 2_750, 4_000, 5_500, 7_500],
        }
    }
}

/// XP to credit conversion policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// XP debited per credit granted
    pub xp_per_credit: u64,
    /// XP that always stays banked and cannot be converted
    pub reserve_floor_xp: u64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            xp_per_credit: 10,
            reserve_floor_xp: 0,
        }
    }
}

/// Streak rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreakConfig {
    /// Day boundary policy, also used for challenge windows and periods
    pub timezone: TimezonePolicy,
    /// Activities that count toward a streak; empty means all
    pub qualifying_kinds: Vec<ActivityKind>,
    /// Smallest quantity that counts
    pub min_quantity: i64,
}

impl StreakConfig {
    /// Check whether an activity counts toward a streak
    #[must_use]
    pub fn qualifies(&self, kind: &ActivityKind, quantity: i64) -> bool {
        quantity >= self.min_quantity
            && (self.qualifying_kinds.is_empty() || self.qualifying_kinds.contains(kind))
    }
}

impl Default for StreakConfig {
    fn default() -> Self {
        Self {
            timezone: TimezonePolicy::default(),
            qualifying_kinds: Vec::new(),
            min_quantity: 1,
        }
    }
}

/// Where a user's day begins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TimezonePolicy {
    /// Days follow UTC
    #[default]
    Utc,
    /// One fixed offset for everyone
    Fixed {
        /// Offset from UTC in minutes
        offset_minutes: i32,
    },
    /// Each user's profile offset, falling back to a default
    PerUser {
        /// Offset for users without one
        default_offset_minutes: i32,
    },
}

impl TimezonePolicy {
    /// Resolve the offset for a user
    #[must_use]
    pub fn resolve(&self, user_offset_minutes: Option<i32>) -> FixedOffset {
        let minutes = match *self {
            Self::Utc => return Utc.fix(),
            Self::Fixed { offset_minutes } => offset_minutes,
            Self::PerUser {
                default_offset_minutes,
            } => user_offset_minutes.unwrap_or(default_offset_minutes),
        };
        FixedOffset::east_opt(minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    fn validate(&self) -> Result<()> {
        let minutes = match *self {
            Self::Utc => 0,
            Self::Fixed { offset_minutes } => offset_minutes,
            Self::PerUser {
                default_offset_minutes,
            } => default_offset_minutes,
        };
        if minutes.abs() > MAX_OFFSET_MINUTES {
            return Err(QuestError::Config(format!(
                "timezone offset {minutes} minutes is out of range"
            )));
        }
        Ok(())
    }
}

/// Challenge window definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeConfig {
    /// First day of a weekly window
    pub week_starts_on: WeekStart,
    /// How long a completed instance stays claimable after its window ends
    pub claim_grace_secs: u64,
}

impl ChallengeConfig {
    /// Claim grace as a duration
    #[must_use]
    pub fn claim_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.claim_grace_secs).unwrap_or(0))
    }
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            week_starts_on: WeekStart::Monday,
            claim_grace_secs: 0,
        }
    }
}

/// First day of a week
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekStart {
    /// ISO weeks
    #[default]
    Monday,
    /// US-style weeks
    Sunday,
}

impl WeekStart {
    /// As chrono weekday
    #[inline]
    #[must_use]
    pub fn weekday(self) -> Weekday {
        match self {
            Self::Monday => Weekday::Mon,
            Self::Sunday => Weekday::Sun,
        }
    }
}

/// Leaderboard ranking policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderboardConfig {
    /// Score metric
    pub metric: MetricKind,
    /// How unit scopes combine member scores
    pub aggregation: Aggregation,
    /// Secondary ordering key for equal scores
    pub tie_break: TieBreak,
}

/// Built-in score metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// XP earned within the period
    #[default]
    EarnedXp,
    /// Credits earned from rewards within the period
    CreditsEarned,
    /// Rewards claimed within the period
    ChallengesClaimed,
}

/// Member score aggregation for department and team scopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Sum of member scores
    #[default]
    Sum,
    /// Integer mean of member scores
    Mean,
}

/// Secondary key for equal scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Ascending entity id
    #[default]
    EntityId,
    /// Whoever reached the score first, then ascending entity id
    EarliestReached,
}

/// Lock behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Longest wait for a per-key lock before reporting a conflict
    pub lock_timeout_ms: u64,
}

impl ConcurrencyConfig {
    /// Lock timeout as a duration
    #[inline]
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 250,
        }
    }
}

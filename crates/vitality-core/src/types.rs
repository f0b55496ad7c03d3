//! Core types for Vitality
//!
//! Defines the identifiers and the single taxonomy shared by every crate:
//! - User, challenge, instance and transaction identifiers
//! - Activity kinds and activity events
//! - Challenge type, difficulty and category
//! - Leaderboard scopes, periods and ranked entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Declares a string-backed identifier supplied by an external system.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create identifier from any string-like value
            #[inline]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow as string slice
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// User identity, owned by the account system
    UserId
);
string_id!(
    /// Published challenge template identifier
    ChallengeId
);
string_id!(
    /// Department identifier
    DepartmentId
);
string_id!(
    /// Team identifier
    TeamId
);
string_id!(
    /// Client-supplied idempotency key for conversions
    RequestId
);

/// Challenge instance identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub Ulid);

impl InstanceId {
    /// Generate new instance ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ledger transaction identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub Ulid);

impl TransactionId {
    /// Generate new transaction ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of wellness activity reported by external collaborators
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// Steps walked
    Steps,
    /// Minutes of moderate or vigorous exercise
    ActiveMinutes,
    /// Minutes spent meditating
    MeditationMinutes,
    /// Hours slept
    SleepHours,
    /// Glasses of water
    WaterGlasses,
    /// Organisation-specific activity
    Custom(String),
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Steps => f.write_str("steps"),
            Self::ActiveMinutes => f.write_str("active_minutes"),
            Self::MeditationMinutes => f.write_str("meditation_minutes"),
            Self::SleepHours => f.write_str("sleep_hours"),
            Self::WaterGlasses => f.write_str("water_glasses"),
            Self::Custom(name) => write!(f, "custom:{name}"),
        }
    }
}

/// Immutable activity record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Who performed the activity
    pub user_id: UserId,
    /// What was done
    pub kind: ActivityKind,
    /// How much (steps, minutes, glasses, ...)
    pub quantity: i64,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

impl ActivityEvent {
    /// Create new activity event
    #[inline]
    #[must_use]
    pub fn new(
        user_id: UserId,
        kind: ActivityKind,
        quantity: i64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            kind,
            quantity,
            timestamp,
        }
    }
}

/// Challenge cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeType {
    /// One window per local day
    Daily,
    /// One window per local week
    Weekly,
    /// A single fixed window
    Special,
}

/// Challenge difficulty
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    /// Easy
    Easy,
    /// Medium
    Medium,
    /// Hard
    Hard,
    /// Extreme
    Extreme,
}

/// Wellness category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Movement and exercise
    Fitness,
    /// Meditation, breathing, focus
    Mindfulness,
    /// Eating habits
    Nutrition,
    /// Rest
    Sleep,
    /// Water intake
    Hydration,
    /// Team and social activities
    Social,
}

/// User as known to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User identity
    pub id: UserId,
    /// Department membership
    pub department: Option<DepartmentId>,
    /// Team membership
    pub team: Option<TeamId>,
    /// Local offset from UTC in minutes, for day boundaries
    pub utc_offset_minutes: Option<i32>,
}

impl UserProfile {
    /// Create profile with no memberships
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            department: None,
            team: None,
            utc_offset_minutes: None,
        }
    }

    /// With department
    #[inline]
    #[must_use]
    pub fn with_department(mut self, department: impl Into<DepartmentId>) -> Self {
        self.department = Some(department.into());
        self
    }

    /// With team
    #[inline]
    #[must_use]
    pub fn with_team(mut self, team: impl Into<TeamId>) -> Self {
        self.team = Some(team.into());
        self
    }

    /// With local UTC offset
    #[inline]
    #[must_use]
    pub fn with_utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = Some(minutes);
        self
    }
}

/// What a leaderboard ranks
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardScope {
    /// Every known user
    Users,
    /// Users of one department
    Department(DepartmentId),
    /// Users of one team
    Team(TeamId),
    /// Departments, scored by aggregating their members
    Departments,
    /// Teams, scored by aggregating their members
    Teams,
}

impl fmt::Display for LeaderboardScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Users => f.write_str("users"),
            Self::Department(id) => write!(f, "department:{id}"),
            Self::Team(id) => write!(f, "team:{id}"),
            Self::Departments => f.write_str("departments"),
            Self::Teams => f.write_str("teams"),
        }
    }
}

/// Scoring period, resolved against the clock when ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    /// Current local day
    Daily,
    /// Current local week
    Weekly,
    /// Current calendar month
    Monthly,
    /// Since the beginning of the ledger
    AllTime,
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::AllTime => "all_time",
        };
        f.write_str(name)
    }
}

/// A ranked leaderboard participant
///
/// Ordering (variant, then id) is the stable `EntityId` tie-break.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankedEntity {
    /// A single user
    User(UserId),
    /// A department
    Department(DepartmentId),
    /// A team
    Team(TeamId),
}

impl fmt::Display for RankedEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Department(id) => write!(f, "department:{id}"),
            Self::Team(id) => write!(f, "team:{id}"),
        }
    }
}

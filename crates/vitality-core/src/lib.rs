//! Vitality Core
//!
//! Shared vocabulary for the progression and rewards engine.
//!
//! # Overview
//!
//! - **Identifiers**: [`UserId`], [`ChallengeId`], [`InstanceId`], [`TransactionId`], ...
//! - **Taxonomy**: [`ActivityKind`], [`ChallengeType`], [`Difficulty`], [`Category`]
//! - **Errors**: [`QuestError`], the single error taxonomy every crate returns
//! - **Configuration**: [`EngineConfig`] loaded from TOML or YAML
//! - **Events**: [`EngineEvent`] advisory notifications
//! - **Clock**: [`Clock`] with [`SystemClock`] and [`ManualClock`]
//!
//! # Example
//!
//! ```rust
//! use vitality_core::{EngineConfig, QuestError};
//!
//! let config = EngineConfig::from_toml_str(r#"
//!     [levels]
//!     thresholds = [0, 100, 300]
//!
//!     [conversion]
//!     xp_per_credit = 10
//! "#).unwrap();
//!
//! assert_eq!(config.conversion.xp_per_credit, 10);
//! assert!(matches!(
//!     EngineConfig::from_toml_str("[levels]\nthresholds = [5]"),
//!     Err(QuestError::Config(_))
//! ));
//! ```

#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod types;

// Re-exports
pub use clock::{
    local_midnight, start_of_month, start_of_next_month, start_of_week, Clock, ManualClock,
    SystemClock,
};
pub use config::{
    Aggregation, ChallengeConfig, ConcurrencyConfig, ConversionConfig, EngineConfig,
    LeaderboardConfig, LevelConfig, MetricKind, StreakConfig, TieBreak, TimezonePolicy, WeekStart,
};
pub use error::{EntityKind, QuestError, Result};
pub use events::EngineEvent;
pub use types::{
    ActivityEvent, ActivityKind, Category, ChallengeId, ChallengeType, DepartmentId, Difficulty,
    InstanceId, LeaderboardScope, Period, RankedEntity, RequestId, TeamId, TransactionId,
    UserId, UserProfile,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the engine vocabulary
    pub use crate::{
        ActivityKind, ChallengeId, Clock, EngineConfig, InstanceId, QuestError, RequestId,
        Result, UserId,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

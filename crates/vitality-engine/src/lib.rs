//! Vitality Engine
//!
//! The progression and rewards engine for the wellness portal. Raw activity
//! events come in; levels, streaks, challenge states, balances and
//! leaderboards come out.
//!
//! # Overview
//!
//! - **Engine**: [`RewardsEngine`], the operation surface
//! - **Claims**: exactly-once reward payout, keyed by instance
//! - **Conversions**: XP to credits under a reserve floor, keyed by request
//! - **Events**: [`EventBus`] advisory notifications over `tokio::sync::broadcast`
//! - **Simulator**: [`run_simulator`] seeded concurrent workload with
//!   invariant checks
//!
//! # Example
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use std::sync::Arc;
//! use vitality_challenge::Challenge;
//! use vitality_core::{ActivityKind, ChallengeType, EngineConfig, ManualClock, UserId, UserProfile};
//! use vitality_engine::RewardsEngine;
//!
//! let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
//! let clock = Arc::new(ManualClock::new(start));
//! let engine = RewardsEngine::with_clock(EngineConfig::default(), clock).unwrap();
//!
//! engine.register_user(UserProfile::new("alice")).unwrap();
//! engine
//!     .publish_challenge(
//!         Challenge::new("walk-10k", ChallengeType::Daily, ActivityKind::Steps, 10_000,
//!             start - Duration::days(1), start + Duration::days(30))
//!             .with_reward(100, 10),
//!     )
//!     .unwrap();
//!
//! let alice = UserId::from("alice");
//! let outcome = engine.record_activity(&alice, ActivityKind::Steps, 10_000, start).unwrap();
//! let completed = outcome.progress[0].instance_id;
//!
//! let first = engine.claim(&alice, completed).unwrap();
//! let second = engine.claim(&alice, completed).unwrap();
//! assert_eq!(first.xp_granted, 100);
//! assert!(second.already_claimed);
//! assert_eq!(engine.get_level(&alice).unwrap().level, 2);
//! ```

#![warn(missing_docs)]

pub mod activity;
pub mod bus;
pub mod claim;
pub mod conversion;
pub mod engine;
pub mod simulator;

// Re-exports
pub use activity::{ActivityLog, ActivityOutcome, SkippedInstance};
pub use bus::{EventBus, DEFAULT_CAPACITY};
pub use claim::ClaimResult;
pub use conversion::{ConversionPolicy, ConversionResult};
pub use engine::{RewardsEngine, SweepReport};
pub use simulator::{run_simulator, SimulatorConfig, SimulatorReport, SimulatorStats, Violation};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving the engine
    pub use crate::{ActivityOutcome, ClaimResult, ConversionResult, RewardsEngine};
    pub use vitality_core::prelude::*;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

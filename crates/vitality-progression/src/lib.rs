//! Vitality Progression
//!
//! - [`LevelTable`]: pure mapping from cumulative XP to level and progress
//! - [`StreakTracker`]: consecutive active-day counts, cached per user and
//!   recomputable from the activity log

#![warn(missing_docs)]

pub mod levels;
pub mod streak;

// Re-exports
pub use levels::{LevelProgress, LevelTable};
pub use streak::{local_day, StreakState, StreakTracker};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Vitality Challenge
//!
//! The challenge state machine: published templates, their recurring
//! windows, and per-user instances moving through
//! `Locked -> Active -> Completed -> Claimed` (or `Expired`).
//!
//! # Example
//!
//! ```rust
//! use chrono::{Duration, Offset, TimeZone, Utc};
//! use vitality_challenge::{window_for, Challenge, ChallengeStatus, InstanceRegistry};
//! use vitality_core::{ActivityKind, ChallengeType, UserId, WeekStart};
//!
//! let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
//! let walk = Challenge::new(
//!     "walk-10k",
//!     ChallengeType::Daily,
//!     ActivityKind::Steps,
//!     10_000,
//!     start,
//!     start + Duration::days(30),
//! );
//!
//! let registry = InstanceRegistry::default();
//! let alice = UserId::from("alice");
//! let now = start + Duration::hours(9);
//! let window = window_for(&walk, now, Utc.fix(), WeekStart::Monday).unwrap();
//! let (id, _) = registry.ensure(&alice, &walk, window, now);
//!
//! let update = registry
//!     .with_instance(&alice, id, now, |instance| instance.record_progress(10_000, now))
//!     .unwrap();
//! assert_eq!(update.status, ChallengeStatus::Completed);
//! ```

#![warn(missing_docs)]

pub mod catalog;
pub mod instance;
pub mod lifecycle;
pub mod registry;
pub mod window;

// Re-exports
pub use catalog::{Challenge, ChallengeCatalog};
pub use instance::{ChallengeInstance, ClaimResult, ProgressUpdate};
pub use lifecycle::{allowed_transitions, validate_transition, ChallengeStatus};
pub use registry::{InstanceKey, InstanceRegistry};
pub use window::{window_for, Window};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

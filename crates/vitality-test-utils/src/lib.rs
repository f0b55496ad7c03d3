//! Testing utilities for the Vitality workspace
//!
//! Shared fixtures: configuration, a frozen clock, sample challenges,
//! profiles and a ready-to-use engine.

#![allow(missing_docs)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use vitality_challenge::Challenge;
use vitality_core::{
    ActivityKind, ChallengeId, ChallengeType, Difficulty, EngineConfig, InstanceId, ManualClock,
    UserId, UserProfile,
};
use vitality_engine::RewardsEngine;

/// Monday, 2 March 2026, 09:00 UTC
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

pub fn test_config() -> EngineConfig {
    EngineConfig::default()
        .with_level_thresholds(vec![0, 100, 250, 500, 1_000])
        .with_xp_per_credit(10)
        .with_lock_timeout_ms(5_000)
}

pub fn walk_10k() -> Challenge {
    Challenge::new(
        "walk-10k",
        ChallengeType::Daily,
        ActivityKind::Steps,
        10_000,
        start() - Duration::days(1),
        start() + Duration::days(30),
    )
    .with_name("Walk 10,000 steps")
    .with_reward(100, 10)
}

pub fn water_daily() -> Challenge {
    Challenge::new(
        "water-8",
        ChallengeType::Daily,
        ActivityKind::WaterGlasses,
        8,
        start() - Duration::days(1),
        start() + Duration::days(30),
    )
    .with_difficulty(Difficulty::Easy)
    .with_reward(20, 2)
}

pub fn weekly_active() -> Challenge {
    Challenge::new(
        "active-150",
        ChallengeType::Weekly,
        ActivityKind::ActiveMinutes,
        150,
        start() - Duration::days(1),
        start() + Duration::days(30),
    )
    .with_reward(150, 15)
}

/// Special challenge unlocked by claiming `walk-10k`
pub fn mindful_month() -> Challenge {
    Challenge::new(
        "mindful-month",
        ChallengeType::Special,
        ActivityKind::MeditationMinutes,
        300,
        start() - Duration::days(1),
        start() + Duration::days(30),
    )
    .with_difficulty(Difficulty::Hard)
    .with_prerequisite("walk-10k")
    .with_reward(400, 40)
}

pub fn profiles() -> Vec<UserProfile> {
    vec![
        UserProfile::new("alice").with_department("eng").with_team("red"),
        UserProfile::new("bob").with_department("eng").with_team("blue"),
        UserProfile::new("carol").with_department("ops").with_team("red"),
        UserProfile::new("dave").with_department("ops").with_team("blue"),
    ]
}

pub fn alice() -> UserId {
    UserId::from("alice")
}

pub fn bob() -> UserId {
    UserId::from("bob")
}

/// Engine on a manual clock set to [`start`], with [`profiles`] registered
/// and the sample challenges published
pub fn seeded_engine() -> (RewardsEngine, Arc<ManualClock>) {
    seeded_engine_with(test_config())
}

pub fn seeded_engine_with(config: EngineConfig) -> (RewardsEngine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start()));
    let engine = RewardsEngine::with_clock(config, clock.clone()).unwrap();
    for profile in profiles() {
        engine.register_user(profile).unwrap();
    }
    for challenge in [walk_10k(), water_daily(), weekly_active(), mindful_month()] {
        engine.publish_challenge(challenge).unwrap();
    }
    (engine, clock)
}

/// Open the current window of `challenge` and drive it to its target
pub fn complete(engine: &RewardsEngine, user: &UserId, challenge: &str) -> InstanceId {
    let challenge_id = ChallengeId::from(challenge);
    let target = engine.catalog().get(&challenge_id).unwrap().target;
    let instance = engine
        .open_window(user, &challenge_id, engine.clock().now())
        .unwrap();
    engine
        .record_progress(user, instance.id, i64::try_from(target).unwrap())
        .unwrap();
    instance.id
}

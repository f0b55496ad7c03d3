//! End-to-end engine behavior: events, windows, streaks, leaderboards
//!
//! Run with: cargo test --package vitality-engine --test engine_flow

use chrono::Duration;
use pretty_assertions::assert_eq;
use vitality_challenge::{Challenge, ChallengeStatus};
use vitality_core::{
    ActivityKind, ChallengeId, ChallengeType, Clock, EngineEvent, LeaderboardScope, Period,
    QuestError, RankedEntity, RequestId, TeamId, TimezonePolicy, UserId, UserProfile,
};
use vitality_test_utils::{alice, bob, complete, seeded_engine, seeded_engine_with, start, test_config};

#[tokio::test]
async fn claim_publishes_events_in_order() {
    let (engine, _) = seeded_engine();
    let mut events = engine.subscribe();
    let alice = alice();

    let instance = complete(&engine, &alice, "walk-10k");
    engine.claim(&alice, instance).unwrap();
    engine.claim(&alice, instance).unwrap();

    let completed = events.recv().await.unwrap();
    assert!(matches!(
        completed,
        EngineEvent::ChallengeCompleted { instance_id, .. } if instance_id == instance
    ));

    let claimed = events.recv().await.unwrap();
    assert!(matches!(
        claimed,
        EngineEvent::RewardClaimed { xp_granted: 100, credits_granted: 10, .. }
    ));

    let level_up = events.recv().await.unwrap();
    assert_eq!(
        level_up,
        EngineEvent::LevelUp {
            user_id: alice.clone(),
            from_level: 1,
            to_level: 2,
            at: start(),
        }
    );

    // The replayed claim publishes nothing
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn grant_crossing_several_thresholds_reports_one_level_up() {
    let (engine, _) = seeded_engine();
    let mut events = engine.subscribe();
    let alice = alice();

    engine.grant(&alice, 600, 0, RequestId::from("bonus")).unwrap();
    let event = events.recv().await.unwrap();
    assert!(matches!(
        event,
        EngineEvent::LevelUp { from_level: 1, to_level: 4, .. }
    ));

    // Replayed grant neither writes nor announces
    engine.grant(&alice, 600, 0, RequestId::from("bonus")).unwrap();
    assert_eq!(engine.balance(&alice).unwrap().total_xp, 600);
    assert!(events.try_recv().is_err());
}

#[test]
fn prerequisite_unlocks_dependent_challenge() {
    let (engine, _) = seeded_engine();
    let alice = alice();

    let special = engine
        .open_window(&alice, &"mindful-month".into(), start())
        .unwrap();
    assert_eq!(special.status, ChallengeStatus::Locked);
    assert!(matches!(
        engine.record_progress(&alice, special.id, 10),
        Err(QuestError::InvalidState { .. })
    ));

    let walk = complete(&engine, &alice, "walk-10k");
    engine.claim(&alice, walk).unwrap();

    let unlocked = engine
        .instances(&alice)
        .unwrap()
        .into_iter()
        .find(|i| i.id == special.id)
        .unwrap();
    assert_eq!(unlocked.status, ChallengeStatus::Active);

    let update = engine
        .record_activity(&alice, ActivityKind::MeditationMinutes, 30, start())
        .unwrap();
    assert_eq!(update.progress[0].progress, 30);
}

#[test]
fn unclaimed_completion_expires_with_its_window() {
    let (engine, clock) = seeded_engine();
    let alice = alice();
    let instance = complete(&engine, &alice, "walk-10k");

    clock.advance(Duration::days(1));
    let report = engine.sweep();
    assert!(report.expired >= 1);

    assert!(matches!(
        engine.claim(&alice, instance),
        Err(QuestError::InvalidState { .. })
    ));
    assert!(engine.ledger().view().is_empty());

    assert_eq!(engine.archive_closed(clock.now()), 1);
    assert!(engine.instances(&alice).unwrap().iter().all(|i| i.id != instance));
    assert_eq!(engine.history(&alice)[0].status, ChallengeStatus::Expired);
}

#[test]
fn window_rollover_starts_fresh_instance() {
    let (engine, clock) = seeded_engine();
    let alice = alice();

    let monday = engine
        .record_activity(&alice, ActivityKind::Steps, 6_000, start())
        .unwrap();
    clock.advance(Duration::days(1));
    let tuesday = engine
        .record_activity(&alice, ActivityKind::Steps, 2_000, clock.now())
        .unwrap();

    assert_ne!(monday.progress[0].instance_id, tuesday.progress[0].instance_id);
    assert_eq!(tuesday.progress[0].progress, 2_000);

    // A late event for Monday lands on the expired instance and is skipped
    let late = engine
        .record_activity(&alice, ActivityKind::Steps, 5_000, start())
        .unwrap();
    assert!(late.progress.is_empty());
    assert_eq!(late.skipped.len(), 1);
    assert_eq!(late.skipped[0].instance_id, monday.progress[0].instance_id);
    assert_eq!(late.skipped[0].status, ChallengeStatus::Expired);
    assert!(late.streak.is_some());
}

#[test]
fn future_dated_activity_is_reported_as_skipped() {
    let (engine, clock) = seeded_engine();
    let alice = alice();

    let tomorrow = start() + Duration::days(1);
    let outcome = engine
        .record_activity(&alice, ActivityKind::Steps, 4_000, tomorrow)
        .unwrap();
    assert!(outcome.progress.is_empty());
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].status, ChallengeStatus::Locked);

    // The window opens with the clock
    clock.advance(Duration::days(1));
    let update = engine
        .record_progress(&alice, outcome.skipped[0].instance_id, 4_000)
        .unwrap();
    assert_eq!(update.status, ChallengeStatus::Active);
    assert_eq!(update.progress, 4_000);
}

#[test]
fn instance_window_stays_inside_template_availability() {
    let (engine, clock) = seeded_engine();
    let alice = alice();
    let stretch = ChallengeId::from("stretch");

    // Available from noon Monday to noon Wednesday
    let opens = start() + Duration::hours(3);
    let closes = opens + Duration::days(2);
    engine
        .publish_challenge(
            Challenge::new(
                "stretch",
                ChallengeType::Daily,
                ActivityKind::SleepHours,
                8,
                opens,
                closes,
            )
            .with_reward(30, 3),
        )
        .unwrap();

    let first = engine.open_window(&alice, &stretch, opens).unwrap();
    assert_eq!(first.window_start, opens);
    assert_eq!(first.status, ChallengeStatus::Locked);
    assert!(matches!(
        engine.record_progress(&alice, first.id, 8),
        Err(QuestError::InvalidState { .. })
    ));

    clock.set(opens);
    let update = engine.record_progress(&alice, first.id, 8).unwrap();
    assert_eq!(update.status, ChallengeStatus::Completed);

    let last_morning = closes - Duration::hours(1);
    clock.set(last_morning);
    let last = engine.open_window(&alice, &stretch, last_morning).unwrap();
    assert_eq!(last.window_end, closes);
    assert_eq!(last.status, ChallengeStatus::Active);

    clock.set(closes + Duration::hours(8));
    assert!(matches!(
        engine.record_progress(&alice, last.id, 8),
        Err(QuestError::InvalidState { .. })
    ));
    assert!(engine.ledger().view().is_empty());
}

#[test]
fn offset_change_does_not_open_a_second_instance_for_the_same_day() {
    let config = test_config().with_timezone(TimezonePolicy::PerUser {
        default_offset_minutes: 0,
    });
    let (engine, _) = seeded_engine_with(config);
    let alice = alice();

    let walked = engine
        .record_activity(&alice, ActivityKind::Steps, 10_000, start())
        .unwrap();
    let instance = walked.progress[0].instance_id;
    engine.claim(&alice, instance).unwrap();

    engine
        .register_user(
            UserProfile::new("alice")
                .with_department("eng")
                .with_team("red")
                .with_utc_offset_minutes(60),
        )
        .unwrap();
    let again = engine
        .record_activity(&alice, ActivityKind::Steps, 10_000, start() + Duration::minutes(5))
        .unwrap();
    assert_eq!(again.progress[0].instance_id, instance);
    assert_eq!(again.progress[0].status, ChallengeStatus::Claimed);

    let walks = engine
        .instances(&alice)
        .unwrap()
        .into_iter()
        .filter(|i| i.challenge_id.as_str() == "walk-10k")
        .count();
    assert_eq!(walks, 1);
    assert!(engine.claim(&alice, instance).unwrap().already_claimed);
    assert_eq!(engine.balance(&alice).unwrap().total_xp, 100);
}

#[test]
fn streak_counts_consecutive_local_days() {
    let (engine, clock) = seeded_engine();
    let alice = alice();

    for expected in 1..=3 {
        let outcome = engine
            .record_activity(&alice, ActivityKind::WaterGlasses, 2, clock.now())
            .unwrap();
        assert_eq!(outcome.streak.unwrap().current_streak, expected);
        clock.advance(Duration::days(1));
    }

    // Day 4 passes without activity
    clock.advance(Duration::days(1));
    assert_eq!(engine.get_streak(&alice).unwrap().current_streak, 0);

    let outcome = engine
        .record_activity(&alice, ActivityKind::WaterGlasses, 2, clock.now())
        .unwrap();
    let streak = outcome.streak.unwrap();
    assert_eq!(streak.current_streak, 1);
    assert_eq!(streak.longest_streak, 3);

    // Rebuilding from the activity log agrees with the cache
    assert_eq!(engine.rebuild_streak(&alice).unwrap(), streak);
}

#[test]
fn zero_quantity_does_not_extend_streak() {
    let (engine, _) = seeded_engine();
    let outcome = engine
        .record_activity(&alice(), ActivityKind::Steps, 0, start())
        .unwrap();
    assert!(outcome.streak.is_none());
    assert_eq!(outcome.progress[0].progress, 0);
}

#[tokio::test]
async fn leaderboard_reports_rank_movement() {
    let (engine, _) = seeded_engine();
    let carol = UserId::from("carol");
    engine.grant(&alice(), 300, 0, RequestId::from("a")).unwrap();
    engine.grant(&bob(), 200, 0, RequestId::from("b")).unwrap();
    engine.grant(&carol, 100, 0, RequestId::from("c")).unwrap();

    let first = engine
        .get_leaderboard(LeaderboardScope::Users, Period::AllTime)
        .unwrap();
    let order: Vec<_> = first.entries.iter().map(|e| e.entity.to_string()).collect();
    assert_eq!(order, vec!["user:alice", "user:bob", "user:carol", "user:dave"]);
    assert!(first.entries.iter().all(|e| e.rank_delta == 0));

    let mut events = engine.subscribe();
    engine.grant(&carol, 500, 0, RequestId::from("c2")).unwrap();
    let second = engine
        .get_leaderboard(LeaderboardScope::Users, Period::AllTime)
        .unwrap();

    let carol_entry = second.entry(&RankedEntity::User(carol.clone())).unwrap();
    assert_eq!(carol_entry.rank, 1);
    assert_eq!(carol_entry.rank_delta, 2);
    assert_eq!(second.rank_of(&RankedEntity::User(alice())), Some(2));
    assert_eq!(
        second.entry(&RankedEntity::User(alice())).unwrap().rank_delta,
        -1
    );

    let mut moved = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::RankChanged { entity, previous_rank, rank, .. } = event {
            moved.push((entity.to_string(), previous_rank, rank));
        }
    }
    assert_eq!(
        moved,
        vec![
            ("user:carol".to_string(), 3, 1),
            ("user:alice".to_string(), 1, 2),
            ("user:bob".to_string(), 2, 3),
        ]
    );
    assert_eq!(
        engine
            .leaderboard_history(&LeaderboardScope::Users, Period::AllTime)
            .len(),
        2
    );
}

#[test]
fn team_leaderboard_aggregates_members() {
    let (engine, _) = seeded_engine();
    engine.grant(&alice(), 300, 0, RequestId::from("a")).unwrap();
    engine.grant(&bob(), 200, 0, RequestId::from("b")).unwrap();
    engine
        .grant(&UserId::from("dave"), 150, 0, RequestId::from("d"))
        .unwrap();

    let teams = engine
        .get_leaderboard(LeaderboardScope::Teams, Period::Weekly)
        .unwrap();
    let scores: Vec<_> = teams
        .entries
        .iter()
        .map(|e| (e.entity.clone(), e.score))
        .collect();
    assert_eq!(
        scores,
        vec![
            (RankedEntity::Team(TeamId::from("blue")), 350),
            (RankedEntity::Team(TeamId::from("red")), 300),
        ]
    );

    let red = engine
        .get_leaderboard(LeaderboardScope::Team(TeamId::from("red")), Period::Daily)
        .unwrap();
    assert_eq!(red.entries.len(), 2);
    assert_eq!(red.entries[0].entity, RankedEntity::User(alice()));
}

#[test]
fn daily_leaderboard_ignores_earlier_days() {
    let (engine, clock) = seeded_engine();
    engine.grant(&alice(), 300, 0, RequestId::from("a")).unwrap();
    clock.advance(Duration::days(1));
    engine.grant(&bob(), 50, 0, RequestId::from("b")).unwrap();

    let daily = engine
        .get_leaderboard(LeaderboardScope::Users, Period::Daily)
        .unwrap();
    assert_eq!(daily.entries[0].entity, RankedEntity::User(bob()));
    assert_eq!(daily.entries[0].score, 50);
    assert_eq!(daily.entry(&RankedEntity::User(alice())).unwrap().score, 0);
}

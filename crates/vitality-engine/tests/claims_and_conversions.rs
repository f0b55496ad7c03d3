//! Exactly-once claims and idempotent conversions
//!
//! Run with: cargo test --package vitality-engine --test claims_and_conversions

use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::thread;
use vitality_core::{ActivityKind, QuestError, RequestId};
use vitality_ledger::TransactionReason;
use vitality_test_utils::{alice, bob, complete, seeded_engine, seeded_engine_with, start, test_config};

#[test]
fn ten_thousand_steps_claimed_once() {
    let (engine, _) = seeded_engine();
    let alice = alice();

    let first = engine
        .record_activity(&alice, ActivityKind::Steps, 7_500, start())
        .unwrap();
    assert_eq!(first.progress.len(), 1);
    assert_eq!(first.progress[0].progress, 7_500);
    assert_eq!(first.completed().count(), 0);

    let second = engine
        .record_activity(&alice, ActivityKind::Steps, 3_000, start())
        .unwrap();
    let update = &second.progress[0];
    assert_eq!(update.progress, 10_000);
    assert!(update.newly_completed);

    let claim = engine.claim(&alice, update.instance_id).unwrap();
    assert_eq!(claim.xp_granted, 100);
    assert_eq!(claim.credits_granted, 10);
    assert!(!claim.already_claimed);

    let again = engine.claim(&alice, update.instance_id).unwrap();
    assert!(again.already_claimed);
    assert_eq!(again.xp_granted, 100);
    assert_eq!(again.transaction_id, claim.transaction_id);

    let balance = engine.balance(&alice).unwrap();
    assert_eq!(balance.total_xp, 100);
    assert_eq!(balance.credits, 10);
    assert_eq!(engine.ledger().view().len(), 1);
    assert_eq!(engine.get_level(&alice).unwrap().level, 2);
}

#[test]
fn concurrent_claims_mutate_the_ledger_once() {
    let (engine, _) = seeded_engine();
    let alice = alice();
    let instance = complete(&engine, &alice, "walk-10k");

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| scope.spawn(|| engine.claim(&alice, instance).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let fresh = results.iter().filter(|r| !r.already_claimed).count();
    assert_eq!(fresh, 1);
    let transactions: HashSet<_> = results.iter().map(|r| r.transaction_id).collect();
    assert_eq!(transactions.len(), 1);

    assert_eq!(engine.ledger().view().len(), 1);
    assert_eq!(engine.balance(&alice).unwrap().total_xp, 100);
    engine.verify_ledger().unwrap();
}

#[test]
fn claim_requires_completion_and_ownership() {
    let (engine, _) = seeded_engine();
    let alice = alice();
    let instance = engine
        .open_window(&alice, &"walk-10k".into(), engine.clock().now())
        .unwrap();

    assert!(matches!(
        engine.claim(&alice, instance.id),
        Err(QuestError::InvalidState { .. })
    ));
    assert!(matches!(
        engine.claim(&bob(), instance.id),
        Err(QuestError::NotFound { .. })
    ));
    assert!(engine.ledger().view().is_empty());
}

#[test]
fn conversion_respects_balance() {
    let (engine, _) = seeded_engine();
    let alice = alice();
    engine.grant(&alice, 250, 0, RequestId::from("seed")).unwrap();

    let err = engine.convert(&alice, 26, RequestId::from("big")).unwrap_err();
    assert_eq!(
        err,
        QuestError::InsufficientBalance {
            required: 260,
            available: 250
        }
    );
    assert_eq!(engine.balance(&alice).unwrap().total_xp, 250);

    let ok = engine.convert(&alice, 25, RequestId::from("fits")).unwrap();
    assert_eq!(ok.credits_granted, 25);
    assert_eq!(ok.xp_debited, 250);

    let balance = engine.balance(&alice).unwrap();
    assert_eq!(balance.total_xp, 0);
    assert_eq!(balance.credits, 25);
    // Level follows lifetime XP, not the banked balance
    assert_eq!(balance.lifetime_xp, 250);
    assert_eq!(engine.get_level(&alice).unwrap().level, 3);
}

#[test]
fn repeated_request_id_applies_once() {
    let (engine, _) = seeded_engine();
    let alice = alice();
    engine.grant(&alice, 500, 0, RequestId::from("seed")).unwrap();

    let first = engine.convert(&alice, 10, RequestId::from("r1")).unwrap();
    let second = engine.convert(&alice, 10, RequestId::from("r1")).unwrap();

    assert!(!first.already_applied);
    assert!(second.already_applied);
    assert_eq!(second.transaction_id, first.transaction_id);
    assert_eq!(engine.balance(&alice).unwrap().total_xp, 400);
    assert_eq!(engine.balance(&alice).unwrap().credits, 10);

    // Keys are scoped per user
    engine.grant(&bob(), 500, 0, RequestId::from("seed")).unwrap();
    let other = engine.convert(&bob(), 10, RequestId::from("r1")).unwrap();
    assert!(!other.already_applied);
}

#[test]
fn failed_conversion_does_not_consume_request_id() {
    let (engine, _) = seeded_engine();
    let alice = alice();
    engine.grant(&alice, 250, 0, RequestId::from("seed")).unwrap();

    assert!(engine.convert(&alice, 30, RequestId::from("r1")).is_err());
    engine.grant(&alice, 50, 0, RequestId::from("top-up")).unwrap();

    let retried = engine.convert(&alice, 30, RequestId::from("r1")).unwrap();
    assert!(!retried.already_applied);
    assert_eq!(retried.balance.total_xp, 0);
}

#[test]
fn reserve_floor_is_never_converted() {
    let (engine, _) = seeded_engine_with(test_config().with_reserve_floor_xp(100));
    let alice = alice();
    engine.grant(&alice, 250, 0, RequestId::from("seed")).unwrap();

    let err = engine.convert(&alice, 16, RequestId::from("r1")).unwrap_err();
    assert_eq!(
        err,
        QuestError::InsufficientBalance {
            required: 160,
            available: 150
        }
    );
    engine.convert(&alice, 15, RequestId::from("r2")).unwrap();
    assert_eq!(engine.balance(&alice).unwrap().total_xp, 100);
}

#[test]
fn concurrent_conversions_never_cross_the_floor() {
    let (engine, _) = seeded_engine();
    let alice = alice();
    engine.grant(&alice, 1_000, 0, RequestId::from("seed")).unwrap();

    thread::scope(|scope| {
        for t in 0..8 {
            let engine = &engine;
            let alice = &alice;
            scope.spawn(move || {
                for i in 0..10 {
                    let request = RequestId::new(format!("t{t}-{i}"));
                    match engine.convert(alice, 3, request) {
                        Ok(_) | Err(QuestError::InsufficientBalance { .. }) => {}
                        Err(err) => panic!("unexpected error: {err}"),
                    }
                }
            });
        }
    });

    let balance = engine.balance(&alice).unwrap();
    let conversions = engine
        .ledger()
        .view()
        .iter()
        .filter(|tx| tx.reason == TransactionReason::CreditConversion)
        .count() as u64;
    assert_eq!(conversions, 33);
    assert_eq!(balance.credits, 99);
    assert_eq!(balance.total_xp, 10);
    engine.verify_ledger().unwrap();
}

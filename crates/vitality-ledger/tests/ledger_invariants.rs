//! Ledger invariants under random and concurrent writes
//!
//! Run with: cargo test --package vitality-ledger --test ledger_invariants

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;
use vitality_core::{RequestId, UserId};
use vitality_ledger::{InMemoryLedger, LedgerEntry, LedgerStore, SourceId, TransactionReason};

fn entry(user: &str, xp: i64, credits: i64, key: &str) -> LedgerEntry {
    LedgerEntry::new(
        UserId::from(user),
        xp,
        credits,
        TransactionReason::Adjustment,
        SourceId::Adjustment(RequestId::from(key)),
        DateTime::<Utc>::UNIX_EPOCH,
    )
}

#[test]
fn concurrent_writers_with_shared_keys_apply_once() {
    let ledger = Arc::new(InMemoryLedger::default());

    thread::scope(|scope| {
        for _ in 0..8 {
            let ledger = Arc::clone(&ledger);
            scope.spawn(move || {
                for i in 0..50 {
                    ledger
                        .apply(entry("shared", 10, 1, &format!("req-{i}")))
                        .expect("apply should succeed");
                }
            });
        }
    });

    let balance = ledger.balance(&UserId::from("shared")).unwrap().unwrap();
    assert_eq!(balance.total_xp, 500);
    assert_eq!(balance.credits, 50);
    assert_eq!(ledger.view().len(), 50);
    assert!(ledger.verify_integrity().is_ok());
}

#[test]
fn concurrent_users_do_not_interfere() {
    let ledger = Arc::new(InMemoryLedger::default());

    thread::scope(|scope| {
        for user in 0..6 {
            let ledger = Arc::clone(&ledger);
            scope.spawn(move || {
                let name = format!("user-{user}");
                for i in 0..100 {
                    ledger
                        .apply(entry(&name, 3, 0, &format!("{i}")))
                        .expect("apply should succeed");
                }
            });
        }
    });

    for user in 0..6 {
        let balance = ledger
            .balance(&UserId::new(format!("user-{user}")))
            .unwrap()
            .unwrap();
        assert_eq!(balance.total_xp, 300);
        assert_eq!(balance.version, 100);
    }
    let report = ledger.verify_integrity().unwrap();
    assert_eq!(report.transactions_checked, 600);
    assert_eq!(report.accounts_checked, 6);
}

proptest! {
    #[test]
    fn prop_balances_equal_journal_sums(
        ops in proptest::collection::vec((0..3usize, -50i64..100, 0i64..5, 0..20u32), 1..80)
    ) {
        let ledger = InMemoryLedger::default();
        let users = ["a", "b", "c"];

        for (user, xp, credits, key) in &ops {
            // Rejections (overdrafts) must leave no trace.
            let _ = ledger.apply(entry(users[*user], *xp, *credits, &key.to_string()));
        }

        let view = ledger.view();
        for user in users {
            let id = UserId::from(user);
            let xp: i64 = view.for_user(&id).map(|tx| tx.delta_xp).sum();
            let credits: i64 = view.for_user(&id).map(|tx| tx.delta_credits).sum();
            let earned: u64 = view.for_user(&id).map(|tx| tx.earned_xp()).sum();

            match ledger.balance(&id).unwrap() {
                Some(balance) => {
                    prop_assert_eq!(balance.total_xp as i64, xp);
                    prop_assert_eq!(balance.credits as i64, credits);
                    prop_assert_eq!(balance.lifetime_xp, earned);
                    prop_assert!(balance.lifetime_xp >= balance.total_xp);
                }
                None => prop_assert_eq!(xp, 0),
            }
        }
        prop_assert!(ledger.verify_integrity().is_ok());
    }
}

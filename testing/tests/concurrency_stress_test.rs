//! Concurrency stress tests for last-space scenarios.
//!
//! These tests verify that under heavy concurrent load the ledger hands out
//! exactly the number of spaces a lot holds: no overselling, no lost
//! updates, counter pinned inside `[0, total_spaces]`.
//!
//! Run with: `cargo test --test concurrency_stress_test -- --nocapture`

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use campus_parking_core::{
    CapacityLedger, LedgerError, LotStore, ReservationManager, ReservationStore, TimeWindow,
};
use campus_parking_core::environment::SystemClock;
use campus_parking_core::types::AccountId;
use campus_parking_testing::fixtures;
use campus_parking_testing::mocks::{
    InMemoryLotStore, InMemoryReservationStore, RecordingNotifier,
};
use chrono::{Duration, Utc};
use std::sync::Arc;

fn window() -> TimeWindow {
    let starts_at = Utc::now() + Duration::hours(1);
    TimeWindow::new(starts_at, starts_at + Duration::hours(8)).unwrap()
}

/// Test: 100 concurrent reserve attempts for 1 space.
///
/// Verifies that:
/// - Exactly 1 claim succeeds
/// - Exactly 99 claims fail with `Exhausted`
/// - The final counter reads 0
#[tokio::test]
async fn last_space_concurrency_100_requests() {
    campus_parking_testing::init_test_tracing();
    println!("Concurrency stress test: 100 concurrent claims for 1 space");

    let lots = Arc::new(InMemoryLotStore::new());
    let lot = fixtures::lot("Stadium Overflow", 1, 1);
    let lot_id = lot.lot_id;
    lots.insert(lot);

    let ledger = CapacityLedger::new(Arc::clone(&lots) as Arc<dyn LotStore>);

    println!("  Launching 100 concurrent claim attempts...");
    let mut handles = vec![];
    for i in 0..100 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            let result = ledger.reserve(lot_id, 1).await;
            (i, result)
        }));
    }

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("task panicked"))
        .collect();

    let successes = results.iter().filter(|(_, r)| r.is_ok()).count();
    let exhausted = results
        .iter()
        .filter(|(_, r)| matches!(r, Err(LedgerError::Exhausted { .. })))
        .count();

    println!("  Results: {successes} successes, {exhausted} exhausted");

    assert_eq!(successes, 1, "exactly one claim must win the last space");
    assert_eq!(exhausted, 99, "every other claim must see Exhausted");

    let final_lot = lots.snapshot(lot_id).unwrap();
    assert_eq!(final_lot.available_spaces, 0);
    assert_eq!(final_lot.total_spaces, 1);
}

/// Test: 50 concurrent claims against 3 spaces.
///
/// Exactly 3 win, 47 see `Exhausted`, and the counter never dips below
/// zero.
#[tokio::test]
async fn three_spaces_fifty_concurrent_requests() {
    println!("Concurrency stress test: 50 concurrent claims for 3 spaces");

    let lots = Arc::new(InMemoryLotStore::new());
    let lot = fixtures::lot("Chapel Lot", 3, 3);
    let lot_id = lot.lot_id;
    lots.insert(lot);

    let ledger = CapacityLedger::new(Arc::clone(&lots) as Arc<dyn LotStore>);

    let mut handles = vec![];
    for _ in 0..50 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move { ledger.reserve(lot_id, 1).await }));
    }

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("task panicked"))
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let exhausted = results
        .iter()
        .filter(|r| matches!(r, Err(LedgerError::Exhausted { .. })))
        .count();

    assert_eq!(successes, 3, "exactly three claims must succeed");
    assert_eq!(exhausted, 47);

    let final_lot = lots.snapshot(lot_id).unwrap();
    assert_eq!(final_lot.available_spaces, 0);
}

/// Scenario A from the allocation contract: a lot with 2 of 2 spaces free
/// and three concurrent `create` calls through the reservation manager.
///
/// Two reservations are persisted as `Active`, the third caller gets the
/// typed capacity error, and the counter reads 0.
#[tokio::test]
async fn three_concurrent_reservations_for_two_spaces() {
    let lots = Arc::new(InMemoryLotStore::new());
    let lot = fixtures::lot("Faculty Row", 2, 2);
    let lot_id = lot.lot_id;
    lots.insert(lot);

    let reservations = Arc::new(InMemoryReservationStore::new());
    let manager = ReservationManager::new(
        CapacityLedger::new(Arc::clone(&lots) as Arc<dyn LotStore>),
        Arc::clone(&reservations) as Arc<dyn ReservationStore>,
        Arc::new(SystemClock),
        Arc::new(RecordingNotifier::new()),
    );

    let mut handles = vec![];
    for _ in 0..3 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager.create(lot_id, AccountId::new(), window()).await
        }));
    }

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("task panicked"))
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let capacity_errors = results
        .iter()
        .filter(|r| {
            matches!(
                r,
                Err(campus_parking_core::ReservationError::Ledger(
                    LedgerError::Exhausted { .. }
                ))
            )
        })
        .count();

    assert_eq!(successes, 2);
    assert_eq!(capacity_errors, 1);
    assert_eq!(reservations.len(), 2, "only winning claims persist records");

    let final_lot = lots.snapshot(lot_id).unwrap();
    assert_eq!(final_lot.available_spaces, 0);
}

/// Concurrent mixed traffic: singles and a bulk claim race for the same
/// pool. However the store serializes them, the books must balance:
/// `claimed + available == total` and the counter never exceeds bounds.
#[tokio::test]
async fn mixed_single_and_bulk_claims_balance() {
    let lots = Arc::new(InMemoryLotStore::new());
    let lot = fixtures::lot("Commuter North", 12, 12);
    let lot_id = lot.lot_id;
    lots.insert(lot);

    let ledger = CapacityLedger::new(Arc::clone(&lots) as Arc<dyn LotStore>);

    let mut handles = vec![];
    // 20 single-space claims and 2 bulk claims of 5 race for 12 spaces.
    for n in std::iter::repeat_n(1u32, 20).chain(std::iter::repeat_n(5u32, 2)) {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger.reserve(lot_id, n).await.map(|_| n)
        }));
    }

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("task panicked"))
        .collect();

    let claimed: u32 = results.iter().filter_map(|r| r.as_ref().ok()).sum();

    let final_lot = lots.snapshot(lot_id).unwrap();
    assert_eq!(claimed + final_lot.available_spaces, 12);
    assert!(final_lot.available_spaces <= final_lot.total_spaces);
}

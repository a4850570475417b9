//! Compensation tests: a claim whose owning record fails to persist must be
//! handed back to the lot before the error surfaces.
//!
//! Without the compensating release, a persist failure strands a space as
//! "in use" with no owning record (a ghost allocation) until an operator
//! notices the drift.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use campus_parking_core::environment::{Actor, Role};
use campus_parking_core::types::{AccountId, EventRequestStatus, TimeWindow};
use campus_parking_core::{
    CapacityLedger, EventRequestError, EventRequestLifecycle, EventRequestStore, LotStore,
    ReservationError, ReservationManager, ReservationStore,
};
use campus_parking_testing::fixtures;
use campus_parking_testing::mocks::{
    AllowAllPolicy, FailingEventRequestStore, FailingReservationStore, InMemoryEventRequestStore,
    InMemoryLotStore, InMemoryReservationStore, RecordingNotifier, test_clock,
};
use chrono::{Duration, Utc};
use std::sync::Arc;

fn window() -> TimeWindow {
    let starts_at = Utc::now() + Duration::hours(3);
    TimeWindow::new(starts_at, starts_at + Duration::hours(5)).unwrap()
}

/// A failed reservation insert triggers exactly one compensating release:
/// the counter returns to its pre-claim value and no record exists.
#[tokio::test]
async fn failed_reservation_insert_releases_the_claimed_space() {
    let lots = Arc::new(InMemoryLotStore::new());
    let lot = fixtures::lot("Gym Lot", 6, 6);
    let lot_id = lot.lot_id;
    lots.insert(lot);

    let inner = Arc::new(InMemoryReservationStore::new());
    let failing = Arc::new(FailingReservationStore::new(
        Arc::clone(&inner) as Arc<dyn ReservationStore>
    ));
    let manager = ReservationManager::new(
        CapacityLedger::new(Arc::clone(&lots) as Arc<dyn LotStore>),
        Arc::clone(&failing) as Arc<dyn ReservationStore>,
        Arc::new(test_clock()),
        Arc::new(RecordingNotifier::new()),
    );

    failing.fail_next_inserts(1);
    let err = manager
        .create(lot_id, AccountId::new(), window())
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::Store(_)));

    // No ghost allocation: the claim was compensated and nothing persisted.
    assert_eq!(lots.snapshot(lot_id).unwrap().available_spaces, 6);
    assert!(inner.is_empty());

    // The manager is healthy again once the store recovers.
    let reservation = manager
        .create(lot_id, AccountId::new(), window())
        .await
        .unwrap();
    assert_eq!(lots.snapshot(lot_id).unwrap().available_spaces, 5);
    assert!(inner.snapshot(reservation.reservation_id).is_some());
}

/// A failed approve commit releases the block it had claimed: the request
/// stays pending and the counter is unchanged.
#[tokio::test]
async fn failed_approval_commit_releases_the_claimed_block() {
    let lots = Arc::new(InMemoryLotStore::new());
    let lot = fixtures::lot("Stadium Lot", 30, 30);
    let lot_id = lot.lot_id;
    lots.insert(lot);

    let inner = Arc::new(InMemoryEventRequestStore::new());
    let failing = Arc::new(FailingEventRequestStore::new(
        Arc::clone(&inner) as Arc<dyn EventRequestStore>
    ));
    let lifecycle = EventRequestLifecycle::new(
        CapacityLedger::new(Arc::clone(&lots) as Arc<dyn LotStore>),
        Arc::clone(&failing) as Arc<dyn EventRequestStore>,
        Arc::clone(&lots) as Arc<dyn LotStore>,
        Arc::new(test_clock()),
        Arc::new(AllowAllPolicy),
        Arc::new(RecordingNotifier::new()),
    );

    let admin = Actor {
        account: AccountId::new(),
        role: Role::Admin,
    };

    let request = lifecycle
        .submit(lot_id, AccountId::new(), "Bowl Game", 12, window())
        .await
        .unwrap();

    failing.fail_next_transitions(1);
    let err = lifecycle.approve(request.request_id, &admin).await.unwrap_err();
    assert!(matches!(err, EventRequestError::Store(_)));

    // Claim-then-commit with compensation: the 12 spaces went back.
    assert_eq!(lots.snapshot(lot_id).unwrap().available_spaces, 30);
    let stored = inner.snapshot(request.request_id).unwrap();
    assert_eq!(stored.status, EventRequestStatus::Pending);

    // The admin can retry once the store recovers.
    let approved = lifecycle.approve(request.request_id, &admin).await.unwrap();
    assert_eq!(approved.status, EventRequestStatus::Approved);
    assert_eq!(lots.snapshot(lot_id).unwrap().available_spaces, 18);
}

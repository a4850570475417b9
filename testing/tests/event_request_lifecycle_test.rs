//! State-machine tests for the event-request lifecycle.
//!
//! Covers the submit/approve/deny/cancel transitions, the advisory
//! submission check, decision-time re-validation, and release idempotency
//! for cancelled approvals.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use campus_parking_core::environment::{Actor, Notification, Role, RolePolicy};
use campus_parking_core::types::{AccountId, EventRequestStatus, TimeWindow};
use campus_parking_core::{
    CapacityLedger, EventRequestError, EventRequestLifecycle, EventRequestStore, LedgerError,
    LotStore,
};
use campus_parking_testing::fixtures;
use campus_parking_testing::mocks::{
    InMemoryEventRequestStore, InMemoryLotStore, RecordingNotifier, test_clock,
};
use chrono::{Duration, Utc};
use std::sync::Arc;

struct Harness {
    lots: Arc<InMemoryLotStore>,
    requests: Arc<InMemoryEventRequestStore>,
    notifier: Arc<RecordingNotifier>,
    lifecycle: EventRequestLifecycle,
}

fn harness(total: u32, available: u32) -> (Harness, campus_parking_core::LotId) {
    let lots = Arc::new(InMemoryLotStore::new());
    let lot = fixtures::lot("Event Lot", total, available);
    let lot_id = lot.lot_id;
    lots.insert(lot);

    let requests = Arc::new(InMemoryEventRequestStore::new());
    let notifier = Arc::new(RecordingNotifier::new());

    let lifecycle = EventRequestLifecycle::new(
        CapacityLedger::new(Arc::clone(&lots) as Arc<dyn LotStore>),
        Arc::clone(&requests) as Arc<dyn EventRequestStore>,
        Arc::clone(&lots) as Arc<dyn LotStore>,
        Arc::new(test_clock()),
        Arc::new(RolePolicy),
        Arc::clone(&notifier) as Arc<dyn campus_parking_core::Notifier>,
    );

    (
        Harness {
            lots,
            requests,
            notifier,
            lifecycle,
        },
        lot_id,
    )
}

fn admin() -> Actor {
    Actor {
        account: AccountId::new(),
        role: Role::Admin,
    }
}

fn requester(account: AccountId) -> Actor {
    Actor {
        account,
        role: Role::Requester,
    }
}

fn window() -> TimeWindow {
    let starts_at = Utc::now() + Duration::days(7);
    TimeWindow::new(starts_at, starts_at + Duration::hours(6)).unwrap()
}

#[tokio::test]
async fn submission_is_checked_but_never_claims() {
    let (h, lot_id) = harness(10, 10);

    let request = h
        .lifecycle
        .submit(lot_id, AccountId::new(), "Spring Concert", 5, window())
        .await
        .unwrap();

    assert_eq!(request.status, EventRequestStatus::Pending);
    assert!(!request.capacity_released);
    // Pending requests hold zero claim even though they were checked.
    assert_eq!(h.lots.snapshot(lot_id).unwrap().available_spaces, 10);
}

#[tokio::test]
async fn submission_validation_rejects_before_the_ledger() {
    let (h, lot_id) = harness(10, 10);
    let who = AccountId::new();

    let err = h
        .lifecycle
        .submit(lot_id, who, "Career Fair", 0, window())
        .await
        .unwrap_err();
    assert!(matches!(err, EventRequestError::Validation(_)));

    let err = h
        .lifecycle
        .submit(lot_id, who, "   ", 5, window())
        .await
        .unwrap_err();
    assert!(matches!(err, EventRequestError::Validation(_)));

    let err = h
        .lifecycle
        .submit(campus_parking_core::LotId::new(), who, "Career Fair", 5, window())
        .await
        .unwrap_err();
    assert!(matches!(err, EventRequestError::UnknownLot(_)));

    // Advisory check: 15 vehicles do not fit a 10-space lot today.
    let err = h
        .lifecycle
        .submit(lot_id, who, "Career Fair", 15, window())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EventRequestError::InsufficientForSubmission {
            requested: 15,
            available: 10,
            ..
        }
    ));

    assert_eq!(h.lots.snapshot(lot_id).unwrap().available_spaces, 10);
}

/// Scenario C: approve claims the block, cancel returns it.
#[tokio::test]
async fn approve_then_cancel_restores_availability() {
    let (h, lot_id) = harness(20, 20);
    let owner = AccountId::new();

    let request = h
        .lifecycle
        .submit(lot_id, owner, "Homecoming", 8, window())
        .await
        .unwrap();

    let approved = h.lifecycle.approve(request.request_id, &admin()).await.unwrap();
    assert_eq!(approved.status, EventRequestStatus::Approved);
    assert!(approved.decided_at.is_some());
    assert_eq!(h.lots.snapshot(lot_id).unwrap().available_spaces, 12);

    let cancelled = h
        .lifecycle
        .cancel(request.request_id, &requester(owner))
        .await
        .unwrap();
    assert_eq!(cancelled.status, EventRequestStatus::Cancelled);
    assert!(cancelled.capacity_released);
    assert_eq!(h.lots.snapshot(lot_id).unwrap().available_spaces, 20);

    let released = h
        .notifier
        .delivered()
        .into_iter()
        .find_map(|n| match n {
            Notification::EventRequestCancelled { released, .. } => Some(released),
            _ => None,
        })
        .unwrap();
    assert_eq!(released, 8);
}

/// Scenario B: the advisory check passes at submission, the lot drains
/// before the admin acts, and approval re-validates against the live
/// counter.
#[tokio::test]
async fn approve_fails_when_capacity_changed_since_submission() {
    let (h, lot_id) = harness(10, 10);

    let request = h
        .lifecycle
        .submit(lot_id, AccountId::new(), "Alumni Dinner", 5, window())
        .await
        .unwrap();

    // Ordinary reservations drain the lot while the request sits in the
    // admin queue.
    let ledger = CapacityLedger::new(Arc::clone(&h.lots) as Arc<dyn LotStore>);
    let mut handles = vec![];
    for _ in 0..10 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move { ledger.reserve(lot_id, 1).await }));
    }
    for result in futures::future::join_all(handles).await {
        result.expect("task panicked").expect("claim failed");
    }
    assert_eq!(h.lots.snapshot(lot_id).unwrap().available_spaces, 0);

    let err = h.lifecycle.approve(request.request_id, &admin()).await.unwrap_err();
    assert!(matches!(
        err,
        EventRequestError::Ledger(LedgerError::Exhausted {
            requested: 5,
            available: 0,
            ..
        })
    ));

    // The request stays pending and the counter is untouched.
    let stored = h.requests.snapshot(request.request_id).unwrap();
    assert_eq!(stored.status, EventRequestStatus::Pending);
    assert_eq!(h.lots.snapshot(lot_id).unwrap().available_spaces, 0);
}

#[tokio::test]
async fn deny_never_touches_the_ledger() {
    let (h, lot_id) = harness(10, 10);

    let request = h
        .lifecycle
        .submit(lot_id, AccountId::new(), "Club Expo", 4, window())
        .await
        .unwrap();

    let denied = h.lifecycle.deny(request.request_id, &admin()).await.unwrap();
    assert_eq!(denied.status, EventRequestStatus::Denied);
    assert_eq!(h.lots.snapshot(lot_id).unwrap().available_spaces, 10);

    // Denied is terminal: approval is now illegal.
    let err = h.lifecycle.approve(request.request_id, &admin()).await.unwrap_err();
    assert!(matches!(
        err,
        EventRequestError::IllegalTransition {
            from: EventRequestStatus::Denied,
            attempted: "approve",
        }
    ));
}

#[tokio::test]
async fn cancelling_a_pending_request_skips_the_ledger() {
    let (h, lot_id) = harness(10, 10);
    let owner = AccountId::new();

    let request = h
        .lifecycle
        .submit(lot_id, owner, "Farmers Market", 6, window())
        .await
        .unwrap();

    let cancelled = h
        .lifecycle
        .cancel(request.request_id, &requester(owner))
        .await
        .unwrap();
    assert_eq!(cancelled.status, EventRequestStatus::Cancelled);
    assert!(!cancelled.capacity_released);
    assert_eq!(h.lots.snapshot(lot_id).unwrap().available_spaces, 10);
}

/// Release idempotency: a second cancel of an approved-then-cancelled
/// request must not release the block again.
#[tokio::test]
async fn double_cancel_releases_capacity_once() {
    let (h, lot_id) = harness(20, 20);
    let owner = AccountId::new();

    let request = h
        .lifecycle
        .submit(lot_id, owner, "Graduation", 8, window())
        .await
        .unwrap();
    h.lifecycle.approve(request.request_id, &admin()).await.unwrap();
    assert_eq!(h.lots.snapshot(lot_id).unwrap().available_spaces, 12);

    let first = h
        .lifecycle
        .cancel(request.request_id, &requester(owner))
        .await
        .unwrap();
    assert!(first.capacity_released);
    assert_eq!(h.lots.snapshot(lot_id).unwrap().available_spaces, 20);

    // Retried cancel: terminal no-op, counter unchanged.
    let second = h
        .lifecycle
        .cancel(request.request_id, &requester(owner))
        .await
        .unwrap();
    assert_eq!(second.status, EventRequestStatus::Cancelled);
    assert_eq!(h.lots.snapshot(lot_id).unwrap().available_spaces, 20);

    // And once more through a different actor (admin cleanup).
    h.lifecycle.cancel(request.request_id, &admin()).await.unwrap();
    assert_eq!(h.lots.snapshot(lot_id).unwrap().available_spaces, 20);
}

#[tokio::test]
async fn access_policy_gates_decisions_and_cancellation() {
    let (h, lot_id) = harness(10, 10);
    let owner = AccountId::new();

    let request = h
        .lifecycle
        .submit(lot_id, owner, "Science Fair", 3, window())
        .await
        .unwrap();

    // A requester cannot approve or deny.
    let err = h
        .lifecycle
        .approve(request.request_id, &requester(owner))
        .await
        .unwrap_err();
    assert!(matches!(err, EventRequestError::Forbidden(_)));

    let err = h
        .lifecycle
        .deny(request.request_id, &requester(owner))
        .await
        .unwrap_err();
    assert!(matches!(err, EventRequestError::Forbidden(_)));

    // A stranger cannot cancel someone else's request.
    let err = h
        .lifecycle
        .cancel(request.request_id, &requester(AccountId::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, EventRequestError::Forbidden(_)));

    // The owner can.
    h.lifecycle
        .cancel(request.request_id, &requester(owner))
        .await
        .unwrap();
}

#[tokio::test]
async fn concurrent_approvals_of_distinct_requests_share_the_pool() {
    let (h, lot_id) = harness(10, 10);

    let first = h
        .lifecycle
        .submit(lot_id, AccountId::new(), "Debate Night", 6, window())
        .await
        .unwrap();
    let second = h
        .lifecycle
        .submit(lot_id, AccountId::new(), "Play Opening", 6, window())
        .await
        .unwrap();

    // Two admins act at once; 6 + 6 > 10, so exactly one approval lands.
    let lifecycle_a = h.lifecycle.clone();
    let lifecycle_b = h.lifecycle.clone();
    let admin_a = admin();
    let admin_b = admin();
    let (result_a, result_b) = tokio::join!(
        lifecycle_a.approve(first.request_id, &admin_a),
        lifecycle_b.approve(second.request_id, &admin_b),
    );

    let approvals = [&result_a, &result_b]
        .iter()
        .filter(|r| r.is_ok())
        .count();
    assert_eq!(approvals, 1, "the pool only fits one of the two blocks");

    let lot = h.lots.snapshot(lot_id).unwrap();
    assert_eq!(lot.available_spaces, 4);

    let loser = if result_a.is_ok() { result_b } else { result_a };
    assert!(matches!(
        loser,
        Err(EventRequestError::Ledger(LedgerError::Exhausted { .. }))
    ));
}

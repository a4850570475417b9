//! Mock and in-memory implementations of the core's collaborator traits.
//!
//! The in-memory stores hold one `Mutex` per store and run every
//! conditional primitive entirely under it, which gives them the same
//! atomicity contract as the production SQL statements: two concurrent
//! `try_claim` calls can never both observe the same counter value.

use campus_parking_core::environment::{AccessPolicy, Actor, Clock, Notification, Notifier,
    ProtectedAction};
use campus_parking_core::error::{AccessDenied, StoreError};
use campus_parking_core::store::{
    ClaimOutcome, CloseOutcome, EventRequestStore, LotStore, ReservationStore, ResizeOutcome,
    RestoreOutcome, StoreFuture, TransitionOutcome,
};
use campus_parking_core::types::{
    AccountId, EventRequest, EventRequestId, EventRequestStatus, Lot, LotId, Reservation,
    ReservationId, ReservationStatus,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Clock
// ============================================================================

/// Fixed clock for deterministic tests.
///
/// Always returns the same time, making tests reproducible.
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time.
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Create a default fixed clock for tests (2026-01-01 00:00:00 UTC).
///
/// # Panics
///
/// Panics if the hardcoded timestamp fails to parse, which cannot happen.
#[must_use]
#[allow(clippy::expect_used)]
pub fn test_clock() -> FixedClock {
    FixedClock::new(
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc),
    )
}

// ============================================================================
// Lot store
// ============================================================================

/// In-memory lot store with atomic conditional updates.
#[derive(Default)]
pub struct InMemoryLotStore {
    lots: Mutex<HashMap<LotId, Lot>>,
}

impl InMemoryLotStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a lot (lot administration stand-in).
    pub fn insert(&self, lot: Lot) {
        lock(&self.lots).insert(lot.lot_id, lot);
    }

    /// Read a lot's current state without going through the trait.
    #[must_use]
    pub fn snapshot(&self, lot_id: LotId) -> Option<Lot> {
        lock(&self.lots).get(&lot_id).cloned()
    }
}

impl LotStore for InMemoryLotStore {
    fn fetch(&self, lot_id: LotId) -> StoreFuture<'_, Option<Lot>> {
        Box::pin(async move { Ok(lock(&self.lots).get(&lot_id).cloned()) })
    }

    fn try_claim(&self, lot_id: LotId, n: u32) -> StoreFuture<'_, ClaimOutcome> {
        Box::pin(async move {
            let mut lots = lock(&self.lots);
            let Some(lot) = lots.get_mut(&lot_id) else {
                return Ok(ClaimOutcome::UnknownLot);
            };
            if lot.available_spaces < n {
                return Ok(ClaimOutcome::Exhausted {
                    available: lot.available_spaces,
                });
            }
            lot.available_spaces -= n;
            Ok(ClaimOutcome::Claimed {
                available_after: lot.available_spaces,
            })
        })
    }

    fn restore(&self, lot_id: LotId, n: u32) -> StoreFuture<'_, RestoreOutcome> {
        Box::pin(async move {
            let mut lots = lock(&self.lots);
            let Some(lot) = lots.get_mut(&lot_id) else {
                return Ok(RestoreOutcome::UnknownLot);
            };
            let headroom = lot.total_spaces - lot.available_spaces;
            let applied = n.min(headroom);
            lot.available_spaces += applied;
            Ok(RestoreOutcome::Restored {
                available_after: lot.available_spaces,
                clamped: n - applied,
            })
        })
    }

    fn resize_total(&self, lot_id: LotId, new_total: u32) -> StoreFuture<'_, ResizeOutcome> {
        Box::pin(async move {
            let mut lots = lock(&self.lots);
            let Some(lot) = lots.get_mut(&lot_id) else {
                return Ok(ResizeOutcome::UnknownLot);
            };
            let in_use = lot.spaces_in_use();
            if new_total < in_use {
                return Ok(ResizeOutcome::RejectedBelowCommitted { in_use });
            }
            lot.total_spaces = new_total;
            lot.available_spaces = new_total - in_use;
            Ok(ResizeOutcome::Resized {
                total_spaces: lot.total_spaces,
                available_spaces: lot.available_spaces,
            })
        })
    }
}

// ============================================================================
// Reservation store
// ============================================================================

/// In-memory reservation store with a conditional close.
#[derive(Default)]
pub struct InMemoryReservationStore {
    reservations: Mutex<HashMap<ReservationId, Reservation>>,
}

impl InMemoryReservationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a reservation's current state without going through the trait.
    #[must_use]
    pub fn snapshot(&self, reservation_id: ReservationId) -> Option<Reservation> {
        lock(&self.reservations).get(&reservation_id).cloned()
    }

    /// Number of stored reservations.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.reservations).len()
    }

    /// Whether the store holds no reservations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReservationStore for InMemoryReservationStore {
    fn insert(&self, reservation: Reservation) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            lock(&self.reservations).insert(reservation.reservation_id, reservation);
            Ok(())
        })
    }

    fn fetch(&self, reservation_id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move { Ok(lock(&self.reservations).get(&reservation_id).cloned()) })
    }

    fn close(
        &self,
        reservation_id: ReservationId,
        final_status: ReservationStatus,
        closed_at: DateTime<Utc>,
    ) -> StoreFuture<'_, CloseOutcome> {
        Box::pin(async move {
            let mut reservations = lock(&self.reservations);
            let Some(reservation) = reservations.get_mut(&reservation_id) else {
                return Ok(CloseOutcome::UnknownReservation);
            };
            if reservation.status.is_closed() {
                return Ok(CloseOutcome::AlreadyClosed(reservation.clone()));
            }
            reservation.status = final_status;
            reservation.closed_at = Some(closed_at);
            Ok(CloseOutcome::Closed(reservation.clone()))
        })
    }
}

// ============================================================================
// Event-request store
// ============================================================================

/// In-memory event-request store with CAS transitions and the release
/// marker.
#[derive(Default)]
pub struct InMemoryEventRequestStore {
    requests: Mutex<HashMap<EventRequestId, EventRequest>>,
}

impl InMemoryEventRequestStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a request's current state without going through the trait.
    #[must_use]
    pub fn snapshot(&self, request_id: EventRequestId) -> Option<EventRequest> {
        lock(&self.requests).get(&request_id).cloned()
    }
}

impl EventRequestStore for InMemoryEventRequestStore {
    fn insert(&self, request: EventRequest) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            lock(&self.requests).insert(request.request_id, request);
            Ok(())
        })
    }

    fn fetch(&self, request_id: EventRequestId) -> StoreFuture<'_, Option<EventRequest>> {
        Box::pin(async move { Ok(lock(&self.requests).get(&request_id).cloned()) })
    }

    fn transition(
        &self,
        request_id: EventRequestId,
        from: EventRequestStatus,
        to: EventRequestStatus,
        decision: Option<(AccountId, DateTime<Utc>)>,
    ) -> StoreFuture<'_, TransitionOutcome> {
        Box::pin(async move {
            let mut requests = lock(&self.requests);
            let Some(request) = requests.get_mut(&request_id) else {
                return Ok(TransitionOutcome::UnknownRequest);
            };
            if request.status != from {
                return Ok(TransitionOutcome::Lost {
                    actual: request.status,
                });
            }
            request.status = to;
            if let Some((decided_by, decided_at)) = decision {
                request.decided_by = Some(decided_by);
                request.decided_at = Some(decided_at);
            }
            Ok(TransitionOutcome::Applied(request.clone()))
        })
    }

    fn claim_release_marker(&self, request_id: EventRequestId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let mut requests = lock(&self.requests);
            let Some(request) = requests.get_mut(&request_id) else {
                return Ok(false);
            };
            if request.capacity_released {
                return Ok(false);
            }
            request.capacity_released = true;
            Ok(true)
        })
    }

    fn reset_release_marker(&self, request_id: EventRequestId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            if let Some(request) = lock(&self.requests).get_mut(&request_id) {
                request.capacity_released = false;
            }
            Ok(())
        })
    }
}

// ============================================================================
// Notifier and access policies
// ============================================================================

/// Notifier that records every notification for later assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications delivered so far, in order.
    #[must_use]
    pub fn delivered(&self) -> Vec<Notification> {
        lock(&self.notifications).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            lock(&self.notifications).push(notification);
        })
    }
}

/// Access policy that allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllPolicy;

impl AccessPolicy for AllowAllPolicy {
    fn authorize(
        &self,
        _actor: &Actor,
        _action: ProtectedAction,
    ) -> Pin<Box<dyn Future<Output = Result<(), AccessDenied>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}

/// Access policy that denies everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAllPolicy;

impl AccessPolicy for DenyAllPolicy {
    fn authorize(
        &self,
        _actor: &Actor,
        _action: ProtectedAction,
    ) -> Pin<Box<dyn Future<Output = Result<(), AccessDenied>> + Send + '_>> {
        Box::pin(async {
            Err(AccessDenied {
                reason: "denied by test policy".to_string(),
            })
        })
    }
}

// ============================================================================
// Fault injection
// ============================================================================

/// Lot store wrapper that fails its next `n` calls with
/// [`StoreError::Unavailable`], then delegates.
///
/// Exercises the ledger's bounded-retry envelope.
pub struct FlakyLotStore {
    inner: Arc<dyn LotStore>,
    remaining_failures: AtomicUsize,
}

impl FlakyLotStore {
    /// Wrap a store with no failures queued.
    #[must_use]
    pub fn new(inner: Arc<dyn LotStore>) -> Self {
        Self {
            inner,
            remaining_failures: AtomicUsize::new(0),
        }
    }

    /// Queue the next `n` calls to fail.
    pub fn fail_next(&self, n: usize) {
        self.remaining_failures.store(n, Ordering::SeqCst);
    }

    fn maybe_fail(&self) -> Result<(), StoreError> {
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable(
                "injected transient outage".to_string(),
            ));
        }
        Ok(())
    }
}

impl LotStore for FlakyLotStore {
    fn fetch(&self, lot_id: LotId) -> StoreFuture<'_, Option<Lot>> {
        Box::pin(async move {
            self.maybe_fail()?;
            self.inner.fetch(lot_id).await
        })
    }

    fn try_claim(&self, lot_id: LotId, n: u32) -> StoreFuture<'_, ClaimOutcome> {
        Box::pin(async move {
            self.maybe_fail()?;
            self.inner.try_claim(lot_id, n).await
        })
    }

    fn restore(&self, lot_id: LotId, n: u32) -> StoreFuture<'_, RestoreOutcome> {
        Box::pin(async move {
            self.maybe_fail()?;
            self.inner.restore(lot_id, n).await
        })
    }

    fn resize_total(&self, lot_id: LotId, new_total: u32) -> StoreFuture<'_, ResizeOutcome> {
        Box::pin(async move {
            self.maybe_fail()?;
            self.inner.resize_total(lot_id, new_total).await
        })
    }
}

/// Reservation store wrapper whose `insert` can be made to fail.
///
/// Exercises the claim-then-persist compensation path: a failed insert must
/// trigger exactly one compensating release.
pub struct FailingReservationStore {
    inner: Arc<dyn ReservationStore>,
    failing_inserts: AtomicUsize,
}

impl FailingReservationStore {
    /// Wrap a store with no failures queued.
    #[must_use]
    pub fn new(inner: Arc<dyn ReservationStore>) -> Self {
        Self {
            inner,
            failing_inserts: AtomicUsize::new(0),
        }
    }

    /// Queue the next `n` inserts to fail.
    pub fn fail_next_inserts(&self, n: usize) {
        self.failing_inserts.store(n, Ordering::SeqCst);
    }
}

impl ReservationStore for FailingReservationStore {
    fn insert(&self, reservation: Reservation) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let remaining = self.failing_inserts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failing_inserts.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::Unavailable(
                    "injected insert failure".to_string(),
                ));
            }
            self.inner.insert(reservation).await
        })
    }

    fn fetch(&self, reservation_id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        self.inner.fetch(reservation_id)
    }

    fn close(
        &self,
        reservation_id: ReservationId,
        final_status: ReservationStatus,
        closed_at: DateTime<Utc>,
    ) -> StoreFuture<'_, CloseOutcome> {
        self.inner.close(reservation_id, final_status, closed_at)
    }
}

/// Event-request store wrapper whose `transition` can be made to fail.
///
/// Exercises the approve path's compensating release: a claim whose status
/// commit fails must be handed back to the lot.
pub struct FailingEventRequestStore {
    inner: Arc<dyn EventRequestStore>,
    failing_transitions: AtomicUsize,
}

impl FailingEventRequestStore {
    /// Wrap a store with no failures queued.
    #[must_use]
    pub fn new(inner: Arc<dyn EventRequestStore>) -> Self {
        Self {
            inner,
            failing_transitions: AtomicUsize::new(0),
        }
    }

    /// Queue the next `n` transitions to fail.
    pub fn fail_next_transitions(&self, n: usize) {
        self.failing_transitions.store(n, Ordering::SeqCst);
    }
}

impl EventRequestStore for FailingEventRequestStore {
    fn insert(&self, request: EventRequest) -> StoreFuture<'_, ()> {
        self.inner.insert(request)
    }

    fn fetch(&self, request_id: EventRequestId) -> StoreFuture<'_, Option<EventRequest>> {
        self.inner.fetch(request_id)
    }

    fn transition(
        &self,
        request_id: EventRequestId,
        from: EventRequestStatus,
        to: EventRequestStatus,
        decision: Option<(AccountId, DateTime<Utc>)>,
    ) -> StoreFuture<'_, TransitionOutcome> {
        Box::pin(async move {
            let remaining = self.failing_transitions.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failing_transitions.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::Unavailable(
                    "injected transition failure".to_string(),
                ));
            }
            self.inner.transition(request_id, from, to, decision).await
        })
    }

    fn claim_release_marker(&self, request_id: EventRequestId) -> StoreFuture<'_, bool> {
        self.inner.claim_release_marker(request_id)
    }

    fn reset_release_marker(&self, request_id: EventRequestId) -> StoreFuture<'_, ()> {
        self.inner.reset_release_marker(request_id)
    }
}

//! Store traits for lots, reservations, and event requests.
//!
//! # Design
//!
//! The traits are deliberately minimal: they expose exactly the conditional
//! primitives the allocation logic needs, and nothing that would let a
//! caller write `available_spaces` without going through the ledger.
//!
//! - [`LotStore::try_claim`] and [`LotStore::restore`] are the atomic
//!   counter primitives. Implementations MUST make each call a single
//!   indivisible check-and-write (a conditional `UPDATE`, or a row-locked
//!   transactional read-modify-write). A read-then-write with no atomicity
//!   guard permits two concurrent callers to both observe one free space and
//!   both succeed, driving the counter negative.
//! - [`ReservationStore::close`] and [`EventRequestStore::transition`] are
//!   conditional status updates: they report whether *this* call performed
//!   the transition, which is what makes release exactly-once at the entity
//!   level.
//!
//! # Thread Safety
//!
//! Implementations must be `Send + Sync`; the services hold them as
//! `Arc<dyn ...>` and are called from arbitrarily many tasks at once.
//!
//! # Dyn Compatibility
//!
//! Methods return explicit `Pin<Box<dyn Future>>` instead of `async fn` so
//! the traits stay object-safe behind `Arc<dyn LotStore>`.

use crate::error::StoreError;
use crate::types::{
    EventRequest, EventRequestId, EventRequestStatus, Lot, LotId, Reservation, ReservationId,
    ReservationStatus,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

/// Boxed future alias used by every store method.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Result of an atomic conditional claim against a lot's counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The counter held at least `n` spaces and was decremented.
    Claimed {
        /// Counter value after the decrement
        available_after: u32,
    },
    /// The counter held fewer than `n` spaces and was left untouched.
    Exhausted {
        /// Counter value observed by the failed attempt
        available: u32,
    },
    /// No lot with the given id exists.
    UnknownLot,
}

/// Result of an atomic clamped restore against a lot's counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The counter was incremented, clamped at `total_spaces`.
    Restored {
        /// Counter value after the increment
        available_after: u32,
        /// Units NOT applied because the counter hit `total_spaces`.
        /// Non-zero means a double-release or drift happened upstream.
        clamped: u32,
    },
    /// No lot with the given id exists.
    UnknownLot,
}

/// Result of a guarded `total_spaces` edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeOutcome {
    /// The edit was applied; growing adds to the free pool, shrinking
    /// removes from it.
    Resized {
        /// New total
        total_spaces: u32,
        /// New availability
        available_spaces: u32,
    },
    /// The edit would shrink `total_spaces` below current commitments.
    RejectedBelowCommitted {
        /// Spaces committed at the time of the attempt
        in_use: u32,
    },
    /// No lot with the given id exists.
    UnknownLot,
}

/// Durable per-lot counter store.
pub trait LotStore: Send + Sync {
    /// Load a lot by id. Missing lots are `Ok(None)`, not an error.
    fn fetch(&self, lot_id: LotId) -> StoreFuture<'_, Option<Lot>>;

    /// Atomically check `available_spaces >= n` and decrement.
    ///
    /// # Errors
    ///
    /// Only infrastructure faults; an exhausted counter is a
    /// [`ClaimOutcome`], not an error.
    fn try_claim(&self, lot_id: LotId, n: u32) -> StoreFuture<'_, ClaimOutcome>;

    /// Atomically increment `available_spaces` by `n`, clamped at
    /// `total_spaces`.
    ///
    /// # Errors
    ///
    /// Only infrastructure faults; the clamp is reported in the outcome.
    fn restore(&self, lot_id: LotId, n: u32) -> StoreFuture<'_, RestoreOutcome>;

    /// Atomically change `total_spaces`, rejecting edits that would land
    /// below current commitments.
    ///
    /// # Errors
    ///
    /// Only infrastructure faults; rejection is a [`ResizeOutcome`].
    fn resize_total(&self, lot_id: LotId, new_total: u32) -> StoreFuture<'_, ResizeOutcome>;
}

/// Result of a conditional reservation close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// This call moved the reservation out of `Active`; the caller owes
    /// exactly one `release`.
    Closed(Reservation),
    /// The reservation was already closed; nothing is owed.
    AlreadyClosed(Reservation),
    /// No reservation with the given id exists.
    UnknownReservation,
}

/// Durable reservation records.
pub trait ReservationStore: Send + Sync {
    /// Persist a freshly created `Active` reservation.
    ///
    /// # Errors
    ///
    /// Infrastructure faults. The caller compensates the ledger claim when
    /// this fails.
    fn insert(&self, reservation: Reservation) -> StoreFuture<'_, ()>;

    /// Load a reservation by id.
    fn fetch(&self, reservation_id: ReservationId) -> StoreFuture<'_, Option<Reservation>>;

    /// Conditionally transition `Active -> final_status`.
    ///
    /// Exactly one concurrent caller observes [`CloseOutcome::Closed`]; all
    /// others observe [`CloseOutcome::AlreadyClosed`].
    ///
    /// # Errors
    ///
    /// Only infrastructure faults.
    fn close(
        &self,
        reservation_id: ReservationId,
        final_status: ReservationStatus,
        closed_at: DateTime<Utc>,
    ) -> StoreFuture<'_, CloseOutcome>;
}

/// Result of a conditional event-request status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The compare-and-set matched `from` and committed `to`.
    Applied(EventRequest),
    /// Another caller moved the request first.
    Lost {
        /// Status observed instead of `from`
        actual: EventRequestStatus,
    },
    /// No request with the given id exists.
    UnknownRequest,
}

/// Durable event-request records.
pub trait EventRequestStore: Send + Sync {
    /// Persist a freshly submitted `Pending` request.
    ///
    /// # Errors
    ///
    /// Only infrastructure faults.
    fn insert(&self, request: EventRequest) -> StoreFuture<'_, ()>;

    /// Load a request by id.
    fn fetch(&self, request_id: EventRequestId) -> StoreFuture<'_, Option<EventRequest>>;

    /// Compare-and-set the status column.
    ///
    /// When `decision` is `Some`, the deciding admin and timestamp are
    /// recorded with the transition; when `None`, any existing decision
    /// stamp is left untouched (cancellations must not erase the approval
    /// stamp).
    ///
    /// # Errors
    ///
    /// Only infrastructure faults; losing the race is a
    /// [`TransitionOutcome`].
    fn transition(
        &self,
        request_id: EventRequestId,
        from: EventRequestStatus,
        to: EventRequestStatus,
        decision: Option<(crate::types::AccountId, DateTime<Utc>)>,
    ) -> StoreFuture<'_, TransitionOutcome>;

    /// Compare-and-set `capacity_released: false -> true`.
    ///
    /// Returns `true` iff this call won the marker; the winner (and only
    /// the winner) releases the block.
    ///
    /// # Errors
    ///
    /// Only infrastructure faults.
    fn claim_release_marker(&self, request_id: EventRequestId) -> StoreFuture<'_, bool>;

    /// Reset `capacity_released` to `false` after a failed release so a
    /// retried cancel can release later.
    ///
    /// # Errors
    ///
    /// Only infrastructure faults.
    fn reset_release_marker(&self, request_id: EventRequestId) -> StoreFuture<'_, ()>;
}

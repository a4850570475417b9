//! Error taxonomy for the capacity core.
//!
//! One enum per concern, mirroring the propagation policy:
//!
//! - capacity exhaustion is an expected, typed negative result, handled by
//!   the immediate caller as normal control flow;
//! - validation failures are rejected before the ledger is touched;
//! - transient store faults are retried with bounded backoff and then
//!   surface as `Unavailable`;
//! - invariant anomalies (a release that would overflow `total_spaces`) are
//!   clamped at the store boundary and logged, never raised to callers.

use crate::types::{EventRequestId, EventRequestStatus, LotId, ReservationId};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// A time window whose start does not precede its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid time window: starts_at {starts_at} must precede ends_at {ends_at}")]
pub struct InvalidTimeWindow {
    /// Proposed window start
    pub starts_at: DateTime<Utc>,
    /// Proposed window end
    pub ends_at: DateTime<Utc>,
}

/// Errors surfaced by storage adapters.
///
/// Adapters map their backend's failure modes onto these two classes; the
/// retry layer treats only [`StoreError::Unavailable`] as transient.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached or the operation timed out.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether a bounded retry with backoff is worth attempting.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Errors from the capacity ledger's reserve/release primitives.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The lot does not have `requested` free spaces.
    ///
    /// This is an expected outcome, not a fault: callers branch on it and
    /// report "no spaces available" to the user.
    #[error("lot {lot_id} exhausted: requested {requested}, available {available}")]
    Exhausted {
        /// Lot the claim was made against
        lot_id: LotId,
        /// Spaces the caller asked for
        requested: u32,
        /// Spaces free at the time of the attempt
        available: u32,
    },

    /// The lot id does not resolve to a stored lot.
    #[error("unknown lot {0}")]
    UnknownLot(LotId),

    /// Reserve and release both require a quantity of at least one.
    #[error("quantity must be at least 1, got {0}")]
    InvalidQuantity(u32),

    /// Shrinking `total_spaces` below current commitments was rejected.
    #[error("lot {lot_id} cannot shrink to {requested_total}: {in_use} spaces in use")]
    ShrinkBelowCommitted {
        /// Lot being resized
        lot_id: LotId,
        /// Proposed new total
        requested_total: u32,
        /// Spaces currently committed
        in_use: u32,
    },

    /// The store stayed unreachable through the bounded retry envelope.
    #[error("capacity store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Errors from the reservation manager.
#[derive(Debug, Error)]
pub enum ReservationError {
    /// Capacity claim failed (exhausted lot, unknown lot, ledger fault).
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The reservation id does not resolve to a stored reservation.
    #[error("unknown reservation {0}")]
    UnknownReservation(ReservationId),

    /// The reservation record store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the event-request lifecycle.
#[derive(Debug, Error)]
pub enum EventRequestError {
    /// Capacity claim failed at approval time (exhausted lot, ledger fault).
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Malformed submission, rejected before the ledger is touched.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The lot preference does not resolve to an existing lot.
    #[error("unknown lot {0}")]
    UnknownLot(LotId),

    /// Advisory submission-time check: the lot cannot currently seat the
    /// requested block. Non-binding fast feedback, not a reservation.
    #[error("lot {lot_id} cannot currently fit {requested} vehicles ({available} available)")]
    InsufficientForSubmission {
        /// Requested lot
        lot_id: LotId,
        /// Block size requested
        requested: u32,
        /// Advisory availability at submission time
        available: u32,
    },

    /// The request id does not resolve to a stored request.
    #[error("unknown event request {0}")]
    UnknownRequest(EventRequestId),

    /// The request is not in a state that admits the attempted operation.
    #[error("cannot {attempted} an event request in state {from}")]
    IllegalTransition {
        /// Status observed at decision time
        from: EventRequestStatus,
        /// Operation that was attempted
        attempted: &'static str,
    },

    /// The actor is not allowed to perform the operation.
    #[error(transparent)]
    Forbidden(#[from] AccessDenied),

    /// The request record store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An access-policy rejection.
#[derive(Debug, Clone, Error)]
#[error("access denied: {reason}")]
pub struct AccessDenied {
    /// Human-readable policy decision
    pub reason: String,
}

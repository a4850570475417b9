//! # Campus Parking Core
//!
//! Capacity-constrained allocation of parking spaces under concurrent
//! demand: the capacity ledger (atomic reserve/release over a per-lot
//! counter), the reservation manager (single-space immediate claims), and
//! the event-request lifecycle (admin-gated bulk claims).
//!
//! Everything storage-facing goes through the traits in [`store`]; the
//! production PostgreSQL adapters live in `campus-parking-postgres` and the
//! deterministic in-memory adapters in `campus-parking-testing`.
//!
//! # Invariant
//!
//! For every lot, at all times, `0 <= available_spaces <= total_spaces`,
//! under arbitrary interleavings of concurrent callers across process
//! boundaries. The ledger is the only writer of the counter; atomicity is
//! provided by the store's conditional-update primitives, not by in-process
//! locks.
//!
//! # Example
//!
//! ```ignore
//! use campus_parking_core::{CapacityLedger, ReservationManager};
//! use campus_parking_core::environment::SystemClock;
//! use std::sync::Arc;
//!
//! let ledger = CapacityLedger::new(lot_store);
//! let manager = ReservationManager::new(ledger, reservation_store, Arc::new(SystemClock), notifier);
//! let reservation = manager.create(lot_id, requester, window).await?;
//! ```

pub mod environment;
pub mod error;
pub mod event_request;
pub mod ledger;
pub mod metrics;
pub mod reservation;
pub mod retry;
pub mod store;
pub mod types;

pub use environment::{AccessPolicy, Actor, Clock, Notification, Notifier, ProtectedAction, Role,
    RolePolicy, SystemClock};
pub use error::{
    AccessDenied, EventRequestError, InvalidTimeWindow, LedgerError, ReservationError, StoreError,
};
pub use event_request::EventRequestLifecycle;
pub use ledger::CapacityLedger;
pub use reservation::ReservationManager;
pub use retry::{RetryPolicy, retry_if};
pub use store::{
    ClaimOutcome, CloseOutcome, EventRequestStore, LotStore, ReservationStore, ResizeOutcome,
    RestoreOutcome, StoreFuture, TransitionOutcome,
};
pub use types::{
    AccountId, EventRequest, EventRequestId, EventRequestStatus, Lot, LotId, Reservation,
    ReservationId, ReservationStatus, TimeWindow,
};

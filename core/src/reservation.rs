//! Reservation manager: single-vehicle claims against a lot.
//!
//! The create path is the canonical claim-then-persist saga: capacity is
//! claimed first, the owning record is written second, and a persist
//! failure triggers a compensating release so no space is ever stranded as
//! "in use" with no owning record (a ghost allocation). The close path uses
//! a conditional status update as the exactly-once gate in front of the
//! release.

use crate::environment::{Clock, Notification, Notifier};
use crate::error::ReservationError;
use crate::ledger::CapacityLedger;
use crate::metrics;
use crate::store::{CloseOutcome, ReservationStore};
use crate::types::{AccountId, LotId, Reservation, ReservationId, ReservationStatus, TimeWindow};
use std::sync::Arc;

/// Creates and terminates single-vehicle reservations.
#[derive(Clone)]
pub struct ReservationManager {
    ledger: CapacityLedger,
    reservations: Arc<dyn ReservationStore>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
}

impl ReservationManager {
    /// Wire a manager over its collaborators.
    #[must_use]
    pub fn new(
        ledger: CapacityLedger,
        reservations: Arc<dyn ReservationStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            ledger,
            reservations,
            clock,
            notifier,
        }
    }

    /// Create a reservation, claiming exactly one space.
    ///
    /// Order matters: the space is claimed before the record is written, so
    /// a reservation is never persisted as `Active` without a confirmed
    /// unit of capacity. If the record write fails, the claimed space is
    /// released again before the error surfaces.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::Ledger`] with `Exhausted` when the lot is
    ///   full: an expected outcome the route layer renders as "no spaces
    ///   available".
    /// - [`ReservationError::Ledger`] with `UnknownLot`/`Unavailable` for
    ///   bad ids and store outages.
    /// - [`ReservationError::Store`] when the record write failed (the
    ///   compensating release has already run).
    pub async fn create(
        &self,
        lot_id: LotId,
        requester: AccountId,
        window: TimeWindow,
    ) -> Result<Reservation, ReservationError> {
        self.ledger.reserve(lot_id, 1).await?;

        let reservation = Reservation {
            reservation_id: ReservationId::new(),
            lot_id,
            requester,
            window,
            status: ReservationStatus::Active,
            created_at: self.clock.now(),
            closed_at: None,
        };

        if let Err(err) = self.reservations.insert(reservation.clone()).await {
            self.compensate_claim(lot_id, reservation.reservation_id)
                .await;
            return Err(err.into());
        }

        metrics::record_reservation("created");
        self.notifier
            .notify(Notification::ReservationCreated {
                reservation_id: reservation.reservation_id,
                lot_id,
                requester,
            })
            .await;

        Ok(reservation)
    }

    /// Cancel a reservation, returning its space.
    ///
    /// Idempotent: cancelling an already closed reservation is a no-op that
    /// returns the stored record, so client retries are always safe.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::UnknownReservation`] for ids that resolve to
    ///   nothing.
    /// - [`ReservationError::Ledger`]/[`ReservationError::Store`] for store
    ///   faults.
    pub async fn cancel(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Reservation, ReservationError> {
        self.close(reservation_id, ReservationStatus::Cancelled)
            .await
    }

    /// Mark a reservation's window as elapsed, returning its space.
    ///
    /// Called by the (external) expiry scheduler. Same exactly-once close
    /// semantics as [`ReservationManager::cancel`].
    ///
    /// # Errors
    ///
    /// As for [`ReservationManager::cancel`].
    pub async fn complete(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Reservation, ReservationError> {
        self.close(reservation_id, ReservationStatus::Completed)
            .await
    }

    /// Load a reservation by id.
    ///
    /// # Errors
    ///
    /// [`ReservationError::UnknownReservation`] or store faults.
    pub async fn fetch(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Reservation, ReservationError> {
        self.reservations
            .fetch(reservation_id)
            .await?
            .ok_or(ReservationError::UnknownReservation(reservation_id))
    }

    /// Conditionally move the reservation out of `Active` and release its
    /// space exactly once.
    async fn close(
        &self,
        reservation_id: ReservationId,
        final_status: ReservationStatus,
    ) -> Result<Reservation, ReservationError> {
        let outcome = self
            .reservations
            .close(reservation_id, final_status, self.clock.now())
            .await?;

        match outcome {
            CloseOutcome::Closed(reservation) => {
                // This call won the transition, so it owes the one release.
                if let Err(err) = self.ledger.release(reservation.lot_id, 1).await {
                    tracing::error!(
                        %reservation_id,
                        lot_id = %reservation.lot_id,
                        error = %err,
                        "reservation closed but release failed; one space may be stranded"
                    );
                    return Err(err.into());
                }

                metrics::record_reservation(final_status.as_str());
                self.notifier
                    .notify(Notification::ReservationClosed {
                        reservation_id,
                        lot_id: reservation.lot_id,
                        status: final_status,
                    })
                    .await;

                Ok(reservation)
            }
            CloseOutcome::AlreadyClosed(reservation) => Ok(reservation),
            CloseOutcome::UnknownReservation => {
                Err(ReservationError::UnknownReservation(reservation_id))
            }
        }
    }

    /// Undo a successful claim whose owning record failed to persist.
    async fn compensate_claim(&self, lot_id: LotId, reservation_id: ReservationId) {
        metrics::record_compensating_release();
        if let Err(release_err) = self.ledger.release(lot_id, 1).await {
            tracing::error!(
                %lot_id,
                %reservation_id,
                error = %release_err,
                "compensating release failed; one space stranded as in use"
            );
        }
    }
}

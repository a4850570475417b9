//! Event-request lifecycle: admin-gated bulk allocation.
//!
//! State machine:
//!
//! ```text
//! pending  --approve(admin)-->    approved    [ledger.reserve(lot, expected_attendees)]
//! pending  --deny(admin)-->       denied      [no ledger interaction]
//! pending  --cancel(requester)--> cancelled   [no ledger interaction]
//! approved --cancel(any)-->       cancelled   [ledger.release(lot, expected_attendees)]
//! ```
//!
//! Submission only *checks* capacity (fast advisory feedback); the claim
//! happens at approval time, against the counter as it is then. Holding
//! capacity for requests that sit in an admin's queue for days would starve
//! ordinary reservations, so a pending request holds zero claim no matter
//! what the submission-time check saw.
//!
//! Approval is claim-then-commit: the block is reserved first and the
//! status flips second, with a compensating release if the commit fails or
//! loses to a concurrent transition. Cancellation of an approved request
//! gates its release behind the `capacity_released` marker so duplicated or
//! retried cancels release the block at most once.

use crate::environment::{AccessPolicy, Actor, Clock, Notification, Notifier, ProtectedAction};
use crate::error::EventRequestError;
use crate::ledger::CapacityLedger;
use crate::metrics;
use crate::store::{EventRequestStore, LotStore, TransitionOutcome};
use crate::types::{
    AccountId, EventRequest, EventRequestId, EventRequestStatus, LotId, TimeWindow,
};
use std::sync::Arc;

/// Drives the event-request state machine over its stores.
#[derive(Clone)]
pub struct EventRequestLifecycle {
    ledger: CapacityLedger,
    requests: Arc<dyn EventRequestStore>,
    lots: Arc<dyn LotStore>,
    clock: Arc<dyn Clock>,
    access: Arc<dyn AccessPolicy>,
    notifier: Arc<dyn Notifier>,
}

impl EventRequestLifecycle {
    /// Wire a lifecycle over its collaborators.
    #[must_use]
    pub fn new(
        ledger: CapacityLedger,
        requests: Arc<dyn EventRequestStore>,
        lots: Arc<dyn LotStore>,
        clock: Arc<dyn Clock>,
        access: Arc<dyn AccessPolicy>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            ledger,
            requests,
            lots,
            clock,
            access,
            notifier,
        }
    }

    /// Submit a request for a block of spaces.
    ///
    /// Runs a **non-binding** availability check: the submission is
    /// rejected up front when the lot cannot currently fit the block, but
    /// nothing is claimed and the check may be stale by the time an admin
    /// decides.
    ///
    /// # Errors
    ///
    /// - [`EventRequestError::Validation`] for `expected_attendees == 0` or
    ///   an empty event name.
    /// - [`EventRequestError::UnknownLot`] when the lot preference does not
    ///   resolve (a validation failure, not a ledger failure).
    /// - [`EventRequestError::InsufficientForSubmission`] from the advisory
    ///   check.
    /// - [`EventRequestError::Store`] for store faults.
    pub async fn submit(
        &self,
        lot_id: LotId,
        requester: AccountId,
        event_name: &str,
        expected_attendees: u32,
        window: TimeWindow,
    ) -> Result<EventRequest, EventRequestError> {
        if expected_attendees == 0 {
            return Err(EventRequestError::Validation(
                "expected attendees must be at least 1".to_string(),
            ));
        }
        if event_name.trim().is_empty() {
            return Err(EventRequestError::Validation(
                "event name must not be empty".to_string(),
            ));
        }

        let lot = self
            .lots
            .fetch(lot_id)
            .await?
            .ok_or(EventRequestError::UnknownLot(lot_id))?;

        if expected_attendees > lot.available_spaces {
            return Err(EventRequestError::InsufficientForSubmission {
                lot_id,
                requested: expected_attendees,
                available: lot.available_spaces,
            });
        }

        let request = EventRequest {
            request_id: EventRequestId::new(),
            lot_id,
            requester,
            event_name: event_name.trim().to_string(),
            expected_attendees,
            window,
            status: EventRequestStatus::Pending,
            capacity_released: false,
            decided_by: None,
            decided_at: None,
            created_at: self.clock.now(),
        };

        self.requests.insert(request.clone()).await?;

        metrics::record_event_request("submitted");
        self.notifier
            .notify(Notification::EventRequestSubmitted {
                request_id: request.request_id,
                lot_id,
                expected_attendees,
            })
            .await;

        Ok(request)
    }

    /// Approve a pending request, claiming its block.
    ///
    /// Availability is re-validated here by running the claim itself; the
    /// submission-time check is advisory and may be stale by decision time.
    /// The claim commits before the status does: if the status flip fails
    /// or loses to a concurrent transition, the block is released again.
    ///
    /// # Errors
    ///
    /// - [`EventRequestError::Forbidden`] when the actor may not approve.
    /// - [`EventRequestError::Ledger`] with `Exhausted` when another
    ///   consumer took the spaces since submission. The request stays
    ///   `Pending`; the route layer tells the admin capacity changed.
    /// - [`EventRequestError::IllegalTransition`] when the request is not
    ///   pending.
    /// - [`EventRequestError::UnknownRequest`] / store faults.
    pub async fn approve(
        &self,
        request_id: EventRequestId,
        admin: &Actor,
    ) -> Result<EventRequest, EventRequestError> {
        self.access
            .authorize(admin, ProtectedAction::ApproveRequest)
            .await?;

        let request = self
            .requests
            .fetch(request_id)
            .await?
            .ok_or(EventRequestError::UnknownRequest(request_id))?;

        if request.status != EventRequestStatus::Pending {
            return Err(EventRequestError::IllegalTransition {
                from: request.status,
                attempted: "approve",
            });
        }

        // Claim first. An Exhausted outcome leaves the request pending and
        // surfaces as the typed capacity error.
        self.ledger
            .reserve(request.lot_id, request.expected_attendees)
            .await?;

        let transition = self
            .requests
            .transition(
                request_id,
                EventRequestStatus::Pending,
                EventRequestStatus::Approved,
                Some((admin.account, self.clock.now())),
            )
            .await;

        match transition {
            Ok(TransitionOutcome::Applied(updated)) => {
                metrics::record_event_request("approved");
                self.notifier
                    .notify(Notification::EventRequestDecided {
                        request_id,
                        status: EventRequestStatus::Approved,
                        decided_by: admin.account,
                    })
                    .await;
                Ok(updated)
            }
            Ok(TransitionOutcome::Lost { actual }) => {
                // A concurrent deny/cancel won; give the block back.
                self.compensate_claim(&request).await;
                Err(EventRequestError::IllegalTransition {
                    from: actual,
                    attempted: "approve",
                })
            }
            Ok(TransitionOutcome::UnknownRequest) => {
                self.compensate_claim(&request).await;
                Err(EventRequestError::UnknownRequest(request_id))
            }
            Err(err) => {
                self.compensate_claim(&request).await;
                Err(err.into())
            }
        }
    }

    /// Deny a pending request.
    ///
    /// A pure status transition: nothing was ever claimed, so the ledger is
    /// not involved.
    ///
    /// # Errors
    ///
    /// - [`EventRequestError::Forbidden`] when the actor may not deny.
    /// - [`EventRequestError::IllegalTransition`] when the request is not
    ///   pending (denial does not apply to approved requests).
    /// - [`EventRequestError::UnknownRequest`] / store faults.
    pub async fn deny(
        &self,
        request_id: EventRequestId,
        admin: &Actor,
    ) -> Result<EventRequest, EventRequestError> {
        self.access
            .authorize(admin, ProtectedAction::DenyRequest)
            .await?;

        let transition = self
            .requests
            .transition(
                request_id,
                EventRequestStatus::Pending,
                EventRequestStatus::Denied,
                Some((admin.account, self.clock.now())),
            )
            .await?;

        match transition {
            TransitionOutcome::Applied(updated) => {
                metrics::record_event_request("denied");
                self.notifier
                    .notify(Notification::EventRequestDecided {
                        request_id,
                        status: EventRequestStatus::Denied,
                        decided_by: admin.account,
                    })
                    .await;
                Ok(updated)
            }
            TransitionOutcome::Lost { actual } => Err(EventRequestError::IllegalTransition {
                from: actual,
                attempted: "deny",
            }),
            TransitionOutcome::UnknownRequest => {
                Err(EventRequestError::UnknownRequest(request_id))
            }
        }
    }

    /// Cancel a request.
    ///
    /// - `Pending`: pure status transition, no ledger interaction (nothing
    ///   was ever claimed).
    /// - `Approved`: status transition plus release of the block, gated by
    ///   the `capacity_released` marker so duplicated or retried cancels
    ///   release at most once.
    /// - Already terminal: a no-op returning the stored record. A cancelled
    ///   request that carries an approval stamp but no release marker still
    ///   owes its block (an earlier release failed mid-cancel); the retry
    ///   settles that debt here.
    ///
    /// # Errors
    ///
    /// - [`EventRequestError::Forbidden`] when the actor is neither an
    ///   admin nor the request's owner.
    /// - [`EventRequestError::UnknownRequest`] / ledger and store faults.
    pub async fn cancel(
        &self,
        request_id: EventRequestId,
        actor: &Actor,
    ) -> Result<EventRequest, EventRequestError> {
        let mut request = self
            .requests
            .fetch(request_id)
            .await?
            .ok_or(EventRequestError::UnknownRequest(request_id))?;

        self.access
            .authorize(
                actor,
                ProtectedAction::CancelRequest {
                    requester: request.requester,
                },
            )
            .await?;

        // Statuses only move forward (pending -> approved -> cancelled at
        // the longest), so every lost CAS observes a strictly later status
        // and this loop runs at most three times.
        loop {
            match request.status {
                EventRequestStatus::Denied => return Ok(request),

                EventRequestStatus::Cancelled => {
                    if request.was_approved() && !request.capacity_released {
                        let released = self.release_block(&request).await?;
                        if released > 0 {
                            request.capacity_released = true;
                        }
                    }
                    return Ok(request);
                }

                EventRequestStatus::Pending => {
                    let transition = self
                        .requests
                        .transition(
                            request_id,
                            EventRequestStatus::Pending,
                            EventRequestStatus::Cancelled,
                            None,
                        )
                        .await?;

                    match transition {
                        TransitionOutcome::Applied(updated) => {
                            metrics::record_event_request("cancelled");
                            self.notifier
                                .notify(Notification::EventRequestCancelled {
                                    request_id,
                                    lot_id: updated.lot_id,
                                    released: 0,
                                })
                                .await;
                            return Ok(updated);
                        }
                        TransitionOutcome::Lost { .. } => {
                            request = self.refetch(request_id).await?;
                        }
                        TransitionOutcome::UnknownRequest => {
                            return Err(EventRequestError::UnknownRequest(request_id));
                        }
                    }
                }

                EventRequestStatus::Approved => {
                    let transition = self
                        .requests
                        .transition(
                            request_id,
                            EventRequestStatus::Approved,
                            EventRequestStatus::Cancelled,
                            None,
                        )
                        .await?;

                    match transition {
                        TransitionOutcome::Applied(mut updated) => {
                            let released = self.release_block(&updated).await?;
                            if released > 0 {
                                updated.capacity_released = true;
                            }

                            metrics::record_event_request("cancelled");
                            self.notifier
                                .notify(Notification::EventRequestCancelled {
                                    request_id,
                                    lot_id: updated.lot_id,
                                    released,
                                })
                                .await;
                            return Ok(updated);
                        }
                        TransitionOutcome::Lost { .. } => {
                            request = self.refetch(request_id).await?;
                        }
                        TransitionOutcome::UnknownRequest => {
                            return Err(EventRequestError::UnknownRequest(request_id));
                        }
                    }
                }
            }
        }
    }

    /// Load a request by id.
    ///
    /// # Errors
    ///
    /// [`EventRequestError::UnknownRequest`] or store faults.
    pub async fn fetch(
        &self,
        request_id: EventRequestId,
    ) -> Result<EventRequest, EventRequestError> {
        self.refetch(request_id).await
    }

    async fn refetch(
        &self,
        request_id: EventRequestId,
    ) -> Result<EventRequest, EventRequestError> {
        self.requests
            .fetch(request_id)
            .await?
            .ok_or(EventRequestError::UnknownRequest(request_id))
    }

    /// Release an approved request's block at most once.
    ///
    /// Returns the number of spaces this call actually released: zero when
    /// another caller already claimed the marker.
    async fn release_block(&self, request: &EventRequest) -> Result<u32, EventRequestError> {
        if !self
            .requests
            .claim_release_marker(request.request_id)
            .await?
        {
            return Ok(0);
        }

        if let Err(err) = self
            .ledger
            .release(request.lot_id, request.expected_attendees)
            .await
        {
            // Put the marker back so a retried cancel can release later.
            if let Err(reset_err) = self
                .requests
                .reset_release_marker(request.request_id)
                .await
            {
                tracing::error!(
                    request_id = %request.request_id,
                    lot_id = %request.lot_id,
                    block = request.expected_attendees,
                    error = %reset_err,
                    "release failed and marker reset failed; block stranded as in use"
                );
            }
            return Err(err.into());
        }

        Ok(request.expected_attendees)
    }

    /// Undo an approval-time claim that could not be committed.
    async fn compensate_claim(&self, request: &EventRequest) {
        metrics::record_compensating_release();
        if let Err(err) = self
            .ledger
            .release(request.lot_id, request.expected_attendees)
            .await
        {
            tracing::error!(
                request_id = %request.request_id,
                lot_id = %request.lot_id,
                block = request.expected_attendees,
                error = %err,
                "compensating release failed; block stranded as in use"
            );
        }
    }
}

//! The capacity ledger: the only code path allowed to mutate a lot's
//! `available_spaces` counter.
//!
//! Both consumption paths (single-vehicle reservations and approved event
//! blocks) funnel through [`CapacityLedger::reserve`] and
//! [`CapacityLedger::release`]. The ledger itself is a pure counter
//! primitive: it has no notion of request identity, so entity-level
//! idempotency (a reservation is reserved-for once, a cancelled request
//! releases once) is the caller's job.
//!
//! **Concurrency strategy**: atomicity lives in the store
//! ([`LotStore::try_claim`]/[`LotStore::restore`] are single conditional
//! updates), so correctness holds across process boundaries with no
//! in-process lock. The ledger adds validation, the bounded retry envelope
//! for transient store faults, and anomaly accounting for the release
//! clamp.

use crate::error::{LedgerError, StoreError};
use crate::metrics;
use crate::retry::{RetryPolicy, retry_if};
use crate::store::{ClaimOutcome, LotStore, ResizeOutcome, RestoreOutcome};
use crate::types::LotId;
use std::sync::Arc;

/// Atomic reserve/release primitive over a [`LotStore`].
///
/// Cheap to clone; holds only the store handle and the retry policy.
#[derive(Clone)]
pub struct CapacityLedger {
    lots: Arc<dyn LotStore>,
    retry: RetryPolicy,
}

impl CapacityLedger {
    /// Build a ledger with the default retry policy.
    #[must_use]
    pub fn new(lots: Arc<dyn LotStore>) -> Self {
        Self {
            lots,
            retry: RetryPolicy::default(),
        }
    }

    /// Build a ledger with an explicit retry policy.
    #[must_use]
    pub const fn with_retry_policy(lots: Arc<dyn LotStore>, retry: RetryPolicy) -> Self {
        Self { lots, retry }
    }

    /// Atomically claim `n` spaces from a lot.
    ///
    /// Returns the counter value after the decrement.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidQuantity`] for `n == 0`, before the store is
    ///   touched.
    /// - [`LedgerError::Exhausted`] when the lot holds fewer than `n` free
    ///   spaces. Expected outcome; the counter is untouched and nothing is
    ///   logged at error level.
    /// - [`LedgerError::UnknownLot`] when the id resolves to nothing.
    /// - [`LedgerError::Unavailable`] when the store stays unreachable
    ///   through the retry envelope.
    pub async fn reserve(&self, lot_id: LotId, n: u32) -> Result<u32, LedgerError> {
        if n == 0 {
            return Err(LedgerError::InvalidQuantity(n));
        }

        let outcome = retry_if(
            self.retry.clone(),
            || self.lots.try_claim(lot_id, n),
            StoreError::is_transient,
        )
        .await?;

        match outcome {
            ClaimOutcome::Claimed { available_after } => {
                tracing::debug!(%lot_id, n, available_after, "claimed spaces");
                Ok(available_after)
            }
            ClaimOutcome::Exhausted { available } => {
                metrics::record_capacity_exhausted();
                Err(LedgerError::Exhausted {
                    lot_id,
                    requested: n,
                    available,
                })
            }
            ClaimOutcome::UnknownLot => Err(LedgerError::UnknownLot(lot_id)),
        }
    }

    /// Atomically return `n` spaces to a lot, clamped at `total_spaces`.
    ///
    /// Returns the counter value after the increment. A clamp (some units
    /// not restored because the counter was already at `total_spaces`)
    /// signals a double-release or drift upstream: it is logged and counted
    /// but does not fail the caller, because keeping the stored counter in
    /// bounds takes priority over reporting the anomaly synchronously.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidQuantity`] for `n == 0`.
    /// - [`LedgerError::UnknownLot`] when the id resolves to nothing.
    /// - [`LedgerError::Unavailable`] when the store stays unreachable
    ///   through the retry envelope.
    pub async fn release(&self, lot_id: LotId, n: u32) -> Result<u32, LedgerError> {
        if n == 0 {
            return Err(LedgerError::InvalidQuantity(n));
        }

        let outcome = retry_if(
            self.retry.clone(),
            || self.lots.restore(lot_id, n),
            StoreError::is_transient,
        )
        .await?;

        match outcome {
            RestoreOutcome::Restored {
                available_after,
                clamped,
            } => {
                if clamped > 0 {
                    tracing::warn!(
                        %lot_id,
                        n,
                        clamped,
                        available_after,
                        "release clamped at total_spaces; possible double-release"
                    );
                    metrics::record_capacity_clamped(clamped);
                }
                Ok(available_after)
            }
            RestoreOutcome::UnknownLot => Err(LedgerError::UnknownLot(lot_id)),
        }
    }

    /// Advisory read of the current availability.
    ///
    /// The value may be stale the moment it is returned; binding decisions
    /// go through [`CapacityLedger::reserve`].
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownLot`] or [`LedgerError::Unavailable`].
    pub async fn availability(&self, lot_id: LotId) -> Result<u32, LedgerError> {
        let lot = retry_if(
            self.retry.clone(),
            || self.lots.fetch(lot_id),
            StoreError::is_transient,
        )
        .await?
        .ok_or(LedgerError::UnknownLot(lot_id))?;

        Ok(lot.available_spaces)
    }

    /// Reconciliation read: `total_spaces - available_spaces`.
    ///
    /// External tooling compares this against the sum of outstanding
    /// reservations and approved blocks to detect over-commitment after a
    /// capacity edit.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownLot`] or [`LedgerError::Unavailable`].
    pub async fn spaces_in_use(&self, lot_id: LotId) -> Result<u32, LedgerError> {
        let lot = retry_if(
            self.retry.clone(),
            || self.lots.fetch(lot_id),
            StoreError::is_transient,
        )
        .await?
        .ok_or(LedgerError::UnknownLot(lot_id))?;

        Ok(lot.spaces_in_use())
    }

    /// Guarded capacity edit for the lot-administration workflow.
    ///
    /// Growing the lot adds the new spaces to the free pool. Shrinking
    /// removes free spaces only: an edit below current commitments is
    /// rejected so the counter invariant can never be broken by
    /// administration.
    ///
    /// Returns `(total_spaces, available_spaces)` after the edit.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ShrinkBelowCommitted`] when the new total is less
    ///   than the spaces currently in use.
    /// - [`LedgerError::UnknownLot`] or [`LedgerError::Unavailable`].
    pub async fn resize_total(
        &self,
        lot_id: LotId,
        new_total: u32,
    ) -> Result<(u32, u32), LedgerError> {
        let outcome = retry_if(
            self.retry.clone(),
            || self.lots.resize_total(lot_id, new_total),
            StoreError::is_transient,
        )
        .await?;

        match outcome {
            ResizeOutcome::Resized {
                total_spaces,
                available_spaces,
            } => {
                tracing::info!(%lot_id, total_spaces, available_spaces, "lot capacity edited");
                Ok((total_spaces, available_spaces))
            }
            ResizeOutcome::RejectedBelowCommitted { in_use } => {
                Err(LedgerError::ShrinkBelowCommitted {
                    lot_id,
                    requested_total: new_total,
                    in_use,
                })
            }
            ResizeOutcome::UnknownLot => Err(LedgerError::UnknownLot(lot_id)),
        }
    }
}

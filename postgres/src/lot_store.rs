//! `PostgreSQL`-backed lot counter store.
//!
//! The claim path is a single conditional `UPDATE`: the predicate
//! `available_spaces >= n` and the decrement execute as one atomic
//! row-level operation, so two concurrent claims can never both consume the
//! same space regardless of which process they come from. The restore and
//! resize paths need the pre-update row (to compute the clamp and the
//! commitment guard), so they take a `FOR UPDATE` row lock inside a short
//! transaction instead.

use crate::store_error;
use campus_parking_core::error::StoreError;
use campus_parking_core::store::{
    ClaimOutcome, LotStore, ResizeOutcome, RestoreOutcome, StoreFuture,
};
use campus_parking_core::types::{Lot, LotId};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Lot counter store over a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PostgresLotStore {
    pool: PgPool,
}

impl PostgresLotStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Seed a lot (stand-in for the external lot-administration workflow).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    #[tracing::instrument(skip(self, lot), fields(lot_id = %lot.lot_id))]
    pub async fn insert(&self, lot: &Lot) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO lots (lot_id, name, total_spaces, available_spaces, updated_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (lot_id) DO NOTHING",
        )
        .bind(lot.lot_id.as_uuid())
        .bind(&lot.name)
        .bind(to_db_count(lot.total_spaces)?)
        .bind(to_db_count(lot.available_spaces)?)
        .bind(lot.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error(&e))?;
        Ok(())
    }
}

fn to_db_count(n: u32) -> Result<i32, StoreError> {
    i32::try_from(n).map_err(|e| StoreError::Serialization(format!("space count overflow: {e}")))
}

#[allow(clippy::cast_sign_loss)] // counts are CHECK-constrained non-negative
const fn from_db_count(n: i32) -> u32 {
    n as u32
}

fn lot_from_row(row: (Uuid, String, i32, i32, DateTime<Utc>)) -> Lot {
    let (lot_id, name, total_spaces, available_spaces, updated_at) = row;
    Lot {
        lot_id: LotId::from_uuid(lot_id),
        name,
        total_spaces: from_db_count(total_spaces),
        available_spaces: from_db_count(available_spaces),
        updated_at,
    }
}

impl LotStore for PostgresLotStore {
    fn fetch(&self, lot_id: LotId) -> StoreFuture<'_, Option<Lot>> {
        Box::pin(async move {
            let row: Option<(Uuid, String, i32, i32, DateTime<Utc>)> = sqlx::query_as(
                "SELECT lot_id, name, total_spaces, available_spaces, updated_at
                 FROM lots
                 WHERE lot_id = $1",
            )
            .bind(lot_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error(&e))?;

            Ok(row.map(lot_from_row))
        })
    }

    fn try_claim(&self, lot_id: LotId, n: u32) -> StoreFuture<'_, ClaimOutcome> {
        Box::pin(async move {
            let n_db = to_db_count(n)?;

            let claimed: Option<(i32,)> = sqlx::query_as(
                "UPDATE lots
                 SET available_spaces = available_spaces - $2,
                     updated_at = NOW()
                 WHERE lot_id = $1 AND available_spaces >= $2
                 RETURNING available_spaces",
            )
            .bind(lot_id.as_uuid())
            .bind(n_db)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error(&e))?;

            if let Some((available_after,)) = claimed {
                return Ok(ClaimOutcome::Claimed {
                    available_after: from_db_count(available_after),
                });
            }

            // The atomic claim already failed; this read only classifies the
            // failure for the caller.
            let current: Option<(i32,)> =
                sqlx::query_as("SELECT available_spaces FROM lots WHERE lot_id = $1")
                    .bind(lot_id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| store_error(&e))?;

            Ok(current.map_or(ClaimOutcome::UnknownLot, |(available,)| {
                ClaimOutcome::Exhausted {
                    available: from_db_count(available),
                }
            }))
        })
    }

    fn restore(&self, lot_id: LotId, n: u32) -> StoreFuture<'_, RestoreOutcome> {
        Box::pin(async move {
            let n_db = to_db_count(n)?;

            let mut tx = self.pool.begin().await.map_err(|e| store_error(&e))?;

            let row: Option<(i32, i32)> = sqlx::query_as(
                "SELECT total_spaces, available_spaces FROM lots WHERE lot_id = $1 FOR UPDATE",
            )
            .bind(lot_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| store_error(&e))?;

            // Dropping the transaction rolls it back.
            let Some((total, available)) = row else {
                return Ok(RestoreOutcome::UnknownLot);
            };

            let headroom = total - available;
            let applied = n_db.min(headroom);

            sqlx::query(
                "UPDATE lots
                 SET available_spaces = available_spaces + $2,
                     updated_at = NOW()
                 WHERE lot_id = $1",
            )
            .bind(lot_id.as_uuid())
            .bind(applied)
            .execute(&mut *tx)
            .await
            .map_err(|e| store_error(&e))?;

            tx.commit().await.map_err(|e| store_error(&e))?;

            Ok(RestoreOutcome::Restored {
                available_after: from_db_count(available + applied),
                clamped: from_db_count(n_db - applied),
            })
        })
    }

    fn resize_total(&self, lot_id: LotId, new_total: u32) -> StoreFuture<'_, ResizeOutcome> {
        Box::pin(async move {
            let new_total_db = to_db_count(new_total)?;

            let mut tx = self.pool.begin().await.map_err(|e| store_error(&e))?;

            let row: Option<(i32, i32)> = sqlx::query_as(
                "SELECT total_spaces, available_spaces FROM lots WHERE lot_id = $1 FOR UPDATE",
            )
            .bind(lot_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| store_error(&e))?;

            let Some((total, available)) = row else {
                return Ok(ResizeOutcome::UnknownLot);
            };

            let in_use = total - available;
            if new_total_db < in_use {
                return Ok(ResizeOutcome::RejectedBelowCommitted {
                    in_use: from_db_count(in_use),
                });
            }

            let new_available = new_total_db - in_use;
            sqlx::query(
                "UPDATE lots
                 SET total_spaces = $2,
                     available_spaces = $3,
                     updated_at = NOW()
                 WHERE lot_id = $1",
            )
            .bind(lot_id.as_uuid())
            .bind(new_total_db)
            .bind(new_available)
            .execute(&mut *tx)
            .await
            .map_err(|e| store_error(&e))?;

            tx.commit().await.map_err(|e| store_error(&e))?;

            Ok(ResizeOutcome::Resized {
                total_spaces: new_total,
                available_spaces: from_db_count(new_available),
            })
        })
    }
}

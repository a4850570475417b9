//! `PostgreSQL`-backed reservation records.
//!
//! The close path is a conditional `UPDATE ... WHERE status = 'active'`:
//! exactly one of any number of concurrent close calls flips the row, and
//! only that caller releases the reservation's space.

use crate::store_error;
use campus_parking_core::error::StoreError;
use campus_parking_core::store::{CloseOutcome, ReservationStore, StoreFuture};
use campus_parking_core::types::{
    AccountId, LotId, Reservation, ReservationId, ReservationStatus, TimeWindow,
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

type ReservationRow = (
    Uuid,
    Uuid,
    Uuid,
    DateTime<Utc>,
    DateTime<Utc>,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

const SELECT_COLUMNS: &str =
    "reservation_id, lot_id, requester, starts_at, ends_at, status, created_at, closed_at";

/// Reservation record store over a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PostgresReservationStore {
    pool: PgPool,
}

impl PostgresReservationStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn status_from_db(status: &str) -> Result<ReservationStatus, StoreError> {
    match status {
        "active" => Ok(ReservationStatus::Active),
        "completed" => Ok(ReservationStatus::Completed),
        "cancelled" => Ok(ReservationStatus::Cancelled),
        other => Err(StoreError::Serialization(format!(
            "unknown reservation status '{other}'"
        ))),
    }
}

fn reservation_from_row(row: ReservationRow) -> Result<Reservation, StoreError> {
    let (reservation_id, lot_id, requester, starts_at, ends_at, status, created_at, closed_at) =
        row;

    let window = TimeWindow::new(starts_at, ends_at)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    Ok(Reservation {
        reservation_id: ReservationId::from_uuid(reservation_id),
        lot_id: LotId::from_uuid(lot_id),
        requester: AccountId::from_uuid(requester),
        window,
        status: status_from_db(&status)?,
        created_at,
        closed_at,
    })
}

impl ReservationStore for PostgresReservationStore {
    fn insert(&self, reservation: Reservation) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO reservations
                 (reservation_id, lot_id, requester, starts_at, ends_at, status, created_at, closed_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(reservation.reservation_id.as_uuid())
            .bind(reservation.lot_id.as_uuid())
            .bind(reservation.requester.as_uuid())
            .bind(reservation.window.starts_at())
            .bind(reservation.window.ends_at())
            .bind(reservation.status.as_str())
            .bind(reservation.created_at)
            .bind(reservation.closed_at)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error(&e))?;
            Ok(())
        })
    }

    fn fetch(&self, reservation_id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move {
            let row: Option<ReservationRow> = sqlx::query_as(&format!(
                "SELECT {SELECT_COLUMNS} FROM reservations WHERE reservation_id = $1"
            ))
            .bind(reservation_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error(&e))?;

            row.map(reservation_from_row).transpose()
        })
    }

    fn close(
        &self,
        reservation_id: ReservationId,
        final_status: ReservationStatus,
        closed_at: DateTime<Utc>,
    ) -> StoreFuture<'_, CloseOutcome> {
        Box::pin(async move {
            let closed: Option<ReservationRow> = sqlx::query_as(&format!(
                "UPDATE reservations
                 SET status = $2, closed_at = $3
                 WHERE reservation_id = $1 AND status = 'active'
                 RETURNING {SELECT_COLUMNS}"
            ))
            .bind(reservation_id.as_uuid())
            .bind(final_status.as_str())
            .bind(closed_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error(&e))?;

            if let Some(row) = closed {
                return Ok(CloseOutcome::Closed(reservation_from_row(row)?));
            }

            // The conditional update matched nothing: the reservation is
            // either already closed or missing.
            let current: Option<ReservationRow> = sqlx::query_as(&format!(
                "SELECT {SELECT_COLUMNS} FROM reservations WHERE reservation_id = $1"
            ))
            .bind(reservation_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error(&e))?;

            match current {
                Some(row) => Ok(CloseOutcome::AlreadyClosed(reservation_from_row(row)?)),
                None => Ok(CloseOutcome::UnknownReservation),
            }
        })
    }
}

//! `PostgreSQL`-backed event-request records.
//!
//! Status moves through compare-and-set `UPDATE ... WHERE status = $from`
//! statements, and the `capacity_released` marker is its own CAS
//! (`... WHERE capacity_released = FALSE`) so a cancelled approval releases
//! its block at most once no matter how many cancel calls race.

use crate::store_error;
use campus_parking_core::error::StoreError;
use campus_parking_core::store::{EventRequestStore, StoreFuture, TransitionOutcome};
use campus_parking_core::types::{
    AccountId, EventRequest, EventRequestId, EventRequestStatus, LotId, TimeWindow,
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

type EventRequestRow = (
    Uuid,
    Uuid,
    Uuid,
    String,
    i32,
    DateTime<Utc>,
    DateTime<Utc>,
    String,
    bool,
    Option<Uuid>,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
);

const SELECT_COLUMNS: &str = "request_id, lot_id, requester, event_name, expected_attendees, \
     starts_at, ends_at, status, capacity_released, decided_by, decided_at, created_at";

/// Event-request record store over a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PostgresEventRequestStore {
    pool: PgPool,
}

impl PostgresEventRequestStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn status_from_db(status: &str) -> Result<EventRequestStatus, StoreError> {
    match status {
        "pending" => Ok(EventRequestStatus::Pending),
        "approved" => Ok(EventRequestStatus::Approved),
        "denied" => Ok(EventRequestStatus::Denied),
        "cancelled" => Ok(EventRequestStatus::Cancelled),
        other => Err(StoreError::Serialization(format!(
            "unknown event request status '{other}'"
        ))),
    }
}

#[allow(clippy::cast_sign_loss)] // CHECK-constrained >= 1
fn request_from_row(row: EventRequestRow) -> Result<EventRequest, StoreError> {
    let (
        request_id,
        lot_id,
        requester,
        event_name,
        expected_attendees,
        starts_at,
        ends_at,
        status,
        capacity_released,
        decided_by,
        decided_at,
        created_at,
    ) = row;

    let window = TimeWindow::new(starts_at, ends_at)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    Ok(EventRequest {
        request_id: EventRequestId::from_uuid(request_id),
        lot_id: LotId::from_uuid(lot_id),
        requester: AccountId::from_uuid(requester),
        event_name,
        expected_attendees: expected_attendees as u32,
        window,
        status: status_from_db(&status)?,
        capacity_released,
        decided_by: decided_by.map(AccountId::from_uuid),
        decided_at,
        created_at,
    })
}

impl EventRequestStore for PostgresEventRequestStore {
    fn insert(&self, request: EventRequest) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let expected = i32::try_from(request.expected_attendees)
                .map_err(|e| StoreError::Serialization(format!("attendee count overflow: {e}")))?;

            sqlx::query(
                "INSERT INTO event_requests
                 (request_id, lot_id, requester, event_name, expected_attendees,
                  starts_at, ends_at, status, capacity_released, decided_by, decided_at, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            )
            .bind(request.request_id.as_uuid())
            .bind(request.lot_id.as_uuid())
            .bind(request.requester.as_uuid())
            .bind(&request.event_name)
            .bind(expected)
            .bind(request.window.starts_at())
            .bind(request.window.ends_at())
            .bind(request.status.as_str())
            .bind(request.capacity_released)
            .bind(request.decided_by.map(|account| *account.as_uuid()))
            .bind(request.decided_at)
            .bind(request.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error(&e))?;
            Ok(())
        })
    }

    fn fetch(&self, request_id: EventRequestId) -> StoreFuture<'_, Option<EventRequest>> {
        Box::pin(async move {
            let row: Option<EventRequestRow> = sqlx::query_as(&format!(
                "SELECT {SELECT_COLUMNS} FROM event_requests WHERE request_id = $1"
            ))
            .bind(request_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error(&e))?;

            row.map(request_from_row).transpose()
        })
    }

    fn transition(
        &self,
        request_id: EventRequestId,
        from: EventRequestStatus,
        to: EventRequestStatus,
        decision: Option<(AccountId, DateTime<Utc>)>,
    ) -> StoreFuture<'_, TransitionOutcome> {
        Box::pin(async move {
            // COALESCE keeps an existing decision stamp when the transition
            // carries none (cancellation must not erase the approval stamp).
            let applied: Option<EventRequestRow> = sqlx::query_as(&format!(
                "UPDATE event_requests
                 SET status = $3,
                     decided_by = COALESCE($4, decided_by),
                     decided_at = COALESCE($5, decided_at)
                 WHERE request_id = $1 AND status = $2
                 RETURNING {SELECT_COLUMNS}"
            ))
            .bind(request_id.as_uuid())
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(decision.map(|(account, _)| *account.as_uuid()))
            .bind(decision.map(|(_, at)| at))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error(&e))?;

            if let Some(row) = applied {
                return Ok(TransitionOutcome::Applied(request_from_row(row)?));
            }

            let current: Option<(String,)> =
                sqlx::query_as("SELECT status FROM event_requests WHERE request_id = $1")
                    .bind(request_id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| store_error(&e))?;

            match current {
                Some((status,)) => Ok(TransitionOutcome::Lost {
                    actual: status_from_db(&status)?,
                }),
                None => Ok(TransitionOutcome::UnknownRequest),
            }
        })
    }

    fn claim_release_marker(&self, request_id: EventRequestId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE event_requests
                 SET capacity_released = TRUE
                 WHERE request_id = $1 AND capacity_released = FALSE",
            )
            .bind(request_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| store_error(&e))?;

            Ok(result.rows_affected() == 1)
        })
    }

    fn reset_release_marker(&self, request_id: EventRequestId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "UPDATE event_requests
                 SET capacity_released = FALSE
                 WHERE request_id = $1",
            )
            .bind(request_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| store_error(&e))?;
            Ok(())
        })
    }
}

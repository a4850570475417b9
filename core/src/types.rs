//! Domain types for the campus parking capacity core.
//!
//! Identifiers are Uuid-backed newtypes so a lot id can never be handed to an
//! API expecting a reservation id. Entities carry their own audit fields
//! (`created_at`, decision stamps) but are never the source of truth for how
//! many spaces are in use: the per-lot counter is authoritative and the
//! records are audit trail.

use crate::error::InvalidTimeWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a parking lot
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LotId(Uuid);

impl LotId {
    /// Creates a new random `LotId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `LotId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for LotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a reservation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationId(Uuid);

impl ReservationId {
    /// Creates a new random `ReservationId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ReservationId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a special-event parking request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventRequestId(Uuid);

impl EventRequestId {
    /// Creates a new random `EventRequestId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `EventRequestId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventRequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a user account (requester or administrator)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Creates a new random `AccountId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `AccountId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Value objects
// ============================================================================

/// A half-open time window with a guaranteed `starts_at < ends_at` ordering.
///
/// The fields are private so an inverted window is unrepresentable; callers
/// go through [`TimeWindow::new`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
}

impl TimeWindow {
    /// Build a window, rejecting `starts_at >= ends_at`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTimeWindow`] when the start does not precede the end.
    pub fn new(
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<Self, InvalidTimeWindow> {
        if starts_at >= ends_at {
            return Err(InvalidTimeWindow { starts_at, ends_at });
        }
        Ok(Self { starts_at, ends_at })
    }

    /// Window start
    #[must_use]
    pub const fn starts_at(&self) -> DateTime<Utc> {
        self.starts_at
    }

    /// Window end
    #[must_use]
    pub const fn ends_at(&self) -> DateTime<Utc> {
        self.ends_at
    }
}

// ============================================================================
// Lot
// ============================================================================

/// A parking lot with a fixed total space count and a live availability
/// counter.
///
/// `available_spaces` is mutated exclusively through the capacity ledger;
/// every read outside the ledger is advisory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    /// Lot identifier
    pub lot_id: LotId,
    /// Human-readable lot name (e.g. "North Campus Deck")
    pub name: String,
    /// Total spaces in the lot, edited only by lot administration
    pub total_spaces: u32,
    /// Spaces currently unclaimed, `0 ..= total_spaces`
    pub available_spaces: u32,
    /// Last counter mutation time
    pub updated_at: DateTime<Utc>,
}

impl Lot {
    /// Reconciliation read: spaces currently claimed by reservations and
    /// approved event requests.
    #[must_use]
    pub const fn spaces_in_use(&self) -> u32 {
        self.total_spaces.saturating_sub(self.available_spaces)
    }
}

// ============================================================================
// Reservation
// ============================================================================

/// Status of a single-vehicle reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Holding exactly one space
    Active,
    /// Window elapsed, space returned
    Completed,
    /// Cancelled by the requester, space returned
    Cancelled,
}

impl ReservationStatus {
    /// True for statuses that no longer hold capacity.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Stable text form used by the storage adapters.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-vehicle claim on one space for a time window.
///
/// Exactly one unit of capacity is attributed to the reservation for its
/// entire `Active` lifetime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation identifier
    pub reservation_id: ReservationId,
    /// Lot the space belongs to
    pub lot_id: LotId,
    /// Account that made the reservation
    pub requester: AccountId,
    /// Reserved time window
    pub window: TimeWindow,
    /// Current status
    pub status: ReservationStatus,
    /// When the reservation was created
    pub created_at: DateTime<Utc>,
    /// When the reservation left `Active`, if it has
    pub closed_at: Option<DateTime<Utc>>,
}

// ============================================================================
// EventRequest
// ============================================================================

/// Status of a special-event parking request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventRequestStatus {
    /// Awaiting an admin decision; holds no capacity
    Pending,
    /// Admin approved; holds `expected_attendees` spaces
    Approved,
    /// Admin denied; terminal, never held capacity
    Denied,
    /// Cancelled by requester or admin; terminal
    Cancelled,
}

impl EventRequestStatus {
    /// Terminal statuses admit no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Denied | Self::Cancelled)
    }

    /// Stable text form used by the storage adapters.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EventRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bulk, admin-gated claim on a block of spaces.
///
/// Capacity is attributed only while `status == Approved`; submission merely
/// records the request and gives the requester fast advisory feedback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRequest {
    /// Request identifier
    pub request_id: EventRequestId,
    /// Preferred lot
    pub lot_id: LotId,
    /// Account that submitted the request
    pub requester: AccountId,
    /// What the block is for (e.g. "Homecoming game")
    pub event_name: String,
    /// Block size to allocate on approval, `>= 1`
    pub expected_attendees: u32,
    /// Event time window
    pub window: TimeWindow,
    /// Current state-machine position
    pub status: EventRequestStatus,
    /// Set once the block claimed at approval has been given back.
    ///
    /// This is the idempotency marker for `Approved -> Cancelled`: a retried
    /// or duplicated cancel releases the block at most once.
    pub capacity_released: bool,
    /// Admin who approved or denied the request
    pub decided_by: Option<AccountId>,
    /// When the approve/deny decision was made
    pub decided_at: Option<DateTime<Utc>>,
    /// When the request was submitted
    pub created_at: DateTime<Utc>,
}

impl EventRequest {
    /// Whether an admin approval ever committed for this request.
    ///
    /// Denied requests are terminal, so a `Cancelled` request carrying a
    /// decision stamp can only have come through `Approved`. A cancelled
    /// request with an approval stamp and no release marker still owes its
    /// block back to the lot.
    #[must_use]
    pub const fn was_approved(&self) -> bool {
        matches!(self.status, EventRequestStatus::Approved)
            || (matches!(self.status, EventRequestStatus::Cancelled) && self.decided_at.is_some())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, hour, 0, 0).unwrap()
    }

    #[test]
    fn time_window_rejects_inverted_bounds() {
        assert!(TimeWindow::new(at(10), at(9)).is_err());
        assert!(TimeWindow::new(at(10), at(10)).is_err());
        let window = TimeWindow::new(at(9), at(17)).unwrap();
        assert_eq!(window.starts_at(), at(9));
        assert_eq!(window.ends_at(), at(17));
    }

    #[test]
    fn lot_spaces_in_use_is_total_minus_available() {
        let lot = Lot {
            lot_id: LotId::new(),
            name: "West Deck".to_string(),
            total_spaces: 20,
            available_spaces: 12,
            updated_at: at(8),
        };
        assert_eq!(lot.spaces_in_use(), 8);
    }

    #[test]
    fn terminal_statuses() {
        assert!(EventRequestStatus::Denied.is_terminal());
        assert!(EventRequestStatus::Cancelled.is_terminal());
        assert!(!EventRequestStatus::Pending.is_terminal());
        assert!(!EventRequestStatus::Approved.is_terminal());

        assert!(ReservationStatus::Completed.is_closed());
        assert!(ReservationStatus::Cancelled.is_closed());
        assert!(!ReservationStatus::Active.is_closed());
    }

    #[test]
    fn cancelled_request_with_decision_stamp_counts_as_approved() {
        let window = TimeWindow::new(at(9), at(17)).unwrap();
        let mut request = EventRequest {
            request_id: EventRequestId::new(),
            lot_id: LotId::new(),
            requester: AccountId::new(),
            event_name: "Orientation".to_string(),
            expected_attendees: 40,
            window,
            status: EventRequestStatus::Cancelled,
            capacity_released: false,
            decided_by: Some(AccountId::new()),
            decided_at: Some(at(10)),
            created_at: at(8),
        };
        assert!(request.was_approved());

        request.decided_at = None;
        request.decided_by = None;
        assert!(!request.was_approved());
    }
}

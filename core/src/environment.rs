//! External collaborator traits: clock, notifications, access policy.
//!
//! The capacity core does not own authentication, email, or scheduling.
//! It consumes them through the narrow seams defined here, so production
//! wiring and deterministic test doubles are interchangeable.

use crate::error::AccessDenied;
use crate::types::{AccountId, EventRequestId, EventRequestStatus, LotId, ReservationId,
    ReservationStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

// ============================================================================
// Clock
// ============================================================================

/// Source of the current time, injectable for deterministic tests.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// A state transition the embedding application may want to tell someone
/// about. Content and delivery are out of scope here; the payload carries
/// just enough to route and template a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// A reservation claimed its space and was persisted.
    ReservationCreated {
        /// New reservation
        reservation_id: ReservationId,
        /// Lot the space came from
        lot_id: LotId,
        /// Reserving account
        requester: AccountId,
    },
    /// A reservation left `Active` and its space was returned.
    ReservationClosed {
        /// Closed reservation
        reservation_id: ReservationId,
        /// Lot the space went back to
        lot_id: LotId,
        /// `Completed` or `Cancelled`
        status: ReservationStatus,
    },
    /// An event request entered the queue.
    EventRequestSubmitted {
        /// New request
        request_id: EventRequestId,
        /// Preferred lot
        lot_id: LotId,
        /// Block size requested
        expected_attendees: u32,
    },
    /// An admin approved or denied a pending request.
    EventRequestDecided {
        /// Decided request
        request_id: EventRequestId,
        /// `Approved` or `Denied`
        status: EventRequestStatus,
        /// Deciding admin
        decided_by: AccountId,
    },
    /// A request was cancelled; `released` spaces went back to the lot.
    EventRequestCancelled {
        /// Cancelled request
        request_id: EventRequestId,
        /// Lot the block belonged to
        lot_id: LotId,
        /// Spaces returned by this cancellation (0 for pending requests)
        released: u32,
    },
}

/// Fire-and-forget notification sink.
///
/// Implementations own their delivery and error handling; a failed delivery
/// is logged by the implementation and never fails the state transition
/// that triggered it.
pub trait Notifier: Send + Sync {
    /// Deliver (or enqueue) a notification.
    fn notify(&self, notification: Notification) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

// ============================================================================
// Access policy
// ============================================================================

/// Role attached to an authenticated account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Parking-office administrator
    Admin,
    /// Ordinary account holder
    Requester,
}

/// An authenticated caller, as established by the (external) auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Account identity
    pub account: AccountId,
    /// Granted role
    pub role: Role,
}

/// Operations gated by the access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectedAction {
    /// Approve a pending event request
    ApproveRequest,
    /// Deny a pending event request
    DenyRequest,
    /// Cancel an event request owned by `requester`
    CancelRequest {
        /// Account that submitted the request
        requester: AccountId,
    },
}

/// Authorization seam: "is this actor allowed to do that?".
pub trait AccessPolicy: Send + Sync {
    /// Check the action, resolving to `Err(AccessDenied)` on rejection.
    fn authorize(
        &self,
        actor: &Actor,
        action: ProtectedAction,
    ) -> Pin<Box<dyn Future<Output = Result<(), AccessDenied>> + Send + '_>>;
}

/// Default policy: admins decide, requesters may cancel their own requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct RolePolicy;

impl AccessPolicy for RolePolicy {
    fn authorize(
        &self,
        actor: &Actor,
        action: ProtectedAction,
    ) -> Pin<Box<dyn Future<Output = Result<(), AccessDenied>> + Send + '_>> {
        let actor = *actor;
        Box::pin(async move {
            let allowed = match action {
                ProtectedAction::ApproveRequest | ProtectedAction::DenyRequest => {
                    matches!(actor.role, Role::Admin)
                }
                ProtectedAction::CancelRequest { requester } => {
                    matches!(actor.role, Role::Admin) || actor.account == requester
                }
            };

            if allowed {
                Ok(())
            } else {
                Err(AccessDenied {
                    reason: format!("account {} may not perform {action:?}", actor.account),
                })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn role_policy_gates_decisions_to_admins() {
        let policy = RolePolicy;
        let admin = Actor {
            account: AccountId::new(),
            role: Role::Admin,
        };
        let requester = Actor {
            account: AccountId::new(),
            role: Role::Requester,
        };

        assert!(
            policy
                .authorize(&admin, ProtectedAction::ApproveRequest)
                .await
                .is_ok()
        );
        assert!(
            policy
                .authorize(&requester, ProtectedAction::DenyRequest)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn requesters_may_cancel_only_their_own_requests() {
        let policy = RolePolicy;
        let owner = AccountId::new();
        let requester = Actor {
            account: owner,
            role: Role::Requester,
        };
        let stranger = Actor {
            account: AccountId::new(),
            role: Role::Requester,
        };

        assert!(
            policy
                .authorize(&requester, ProtectedAction::CancelRequest { requester: owner })
                .await
                .is_ok()
        );
        assert!(
            policy
                .authorize(&stranger, ProtectedAction::CancelRequest { requester: owner })
                .await
                .is_err()
        );
    }
}

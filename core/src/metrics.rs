//! Business metrics for the capacity core.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `parking_capacity_exhausted_total` - Claims rejected because a lot was full
//! - `parking_capacity_clamped_total` - Release units dropped by the `total_spaces` clamp
//! - `parking_compensating_release_total` - Releases issued to undo a claim after a persist failure
//! - `parking_reservations_total{status}` - Reservation transitions by final status
//! - `parking_event_requests_total{status}` - Event-request transitions by resulting status

use metrics::describe_counter;

/// Register metric descriptions with the installed recorder.
///
/// Call once at application startup, before any metrics are recorded.
pub fn register_capacity_metrics() {
    describe_counter!(
        "parking_capacity_exhausted_total",
        "Claims rejected because the lot had fewer free spaces than requested"
    );
    describe_counter!(
        "parking_capacity_clamped_total",
        "Release units dropped because the counter was already at total_spaces"
    );
    describe_counter!(
        "parking_compensating_release_total",
        "Releases issued to undo a successful claim whose owning record failed to persist"
    );
    describe_counter!(
        "parking_reservations_total",
        "Reservation transitions by final status (created, completed, cancelled)"
    );
    describe_counter!(
        "parking_event_requests_total",
        "Event-request transitions by resulting status (submitted, approved, denied, cancelled)"
    );
}

/// Record a claim rejected for lack of capacity.
pub fn record_capacity_exhausted() {
    metrics::counter!("parking_capacity_exhausted_total").increment(1);
}

/// Record units dropped by the release clamp (an invariant anomaly).
pub fn record_capacity_clamped(units: u32) {
    metrics::counter!("parking_capacity_clamped_total").increment(u64::from(units));
}

/// Record a compensating release.
pub fn record_compensating_release() {
    metrics::counter!("parking_compensating_release_total").increment(1);
}

/// Record a reservation transition.
pub fn record_reservation(status: &'static str) {
    metrics::counter!("parking_reservations_total", "status" => status).increment(1);
}

/// Record an event-request transition.
pub fn record_event_request(status: &'static str) {
    metrics::counter!("parking_event_requests_total", "status" => status).increment(1);
}

//! # Campus Parking Testing
//!
//! Testing utilities for the campus parking capacity core.
//!
//! This crate provides:
//! - Deterministic in-memory implementations of the store traits, with the
//!   same atomicity contract as the production adapters (every conditional
//!   primitive runs under one lock, so the concurrency tests exercise real
//!   interleavings)
//! - A fixed clock for reproducible timestamps
//! - A recording notifier and permissive/denying access policies
//! - Fault injectors for the retry and compensation paths
//!
//! ## Example
//!
//! ```
//! use campus_parking_core::{CapacityLedger, LotStore};
//! use campus_parking_testing::{fixtures, mocks::InMemoryLotStore};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let lots = Arc::new(InMemoryLotStore::new());
//! let lot = fixtures::lot("Visitor Lot", 10, 10);
//! let lot_id = lot.lot_id;
//! lots.insert(lot);
//!
//! let ledger = CapacityLedger::new(lots as Arc<dyn LotStore>);
//! let after = ledger.reserve(lot_id, 3).await.unwrap();
//! assert_eq!(after, 7);
//! # });
//! ```

pub mod mocks;

/// Install a compact tracing subscriber for test binaries.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_test_writer()
        .try_init();
}

/// Entity builders for test setup.
pub mod fixtures {
    use campus_parking_core::types::{Lot, LotId};
    use chrono::{TimeZone, Utc};

    /// Build a lot with the given counters and a fixed timestamp.
    #[must_use]
    #[allow(clippy::missing_panics_doc)] // hardcoded timestamp always parses
    pub fn lot(name: &str, total_spaces: u32, available_spaces: u32) -> Lot {
        #[allow(clippy::unwrap_used)]
        let updated_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Lot {
            lot_id: LotId::new(),
            name: name.to_string(),
            total_spaces,
            available_spaces,
            updated_at,
        }
    }
}

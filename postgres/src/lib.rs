//! `PostgreSQL` store adapters for the campus parking capacity core.
//!
//! This crate provides production implementations of the store traits from
//! `campus-parking-core`, built on `sqlx` connection pooling:
//!
//! - [`PostgresLotStore`]: the counter store. The claim path is a single
//!   conditional `UPDATE ... WHERE available_spaces >= n` (atomic at the
//!   row level, correct across process boundaries with no application
//!   lock); the clamped restore and the guarded resize run as
//!   `SELECT ... FOR UPDATE` transactions.
//! - [`PostgresReservationStore`]: reservation records with a conditional
//!   close (`... WHERE status = 'active'`) as the exactly-once release
//!   gate.
//! - [`PostgresEventRequestStore`]: event-request records with
//!   compare-and-set status transitions and the `capacity_released` marker.
//!
//! `schema.sql` ships with the crate and is applied by [`apply_schema`];
//! its `CHECK` constraints mirror the counter invariant as defense in
//! depth.
//!
//! # Example
//!
//! ```ignore
//! use campus_parking_postgres::{PostgresConfig, PostgresLotStore, apply_schema, connect};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = connect(&PostgresConfig::from_env()).await?;
//!     apply_schema(&pool).await?;
//!     let lots = PostgresLotStore::new(pool);
//!     Ok(())
//! }
//! ```

mod event_request_store;
mod lot_store;
mod reservation_store;

pub use event_request_store::PostgresEventRequestStore;
pub use lot_store::PostgresLotStore;
pub use reservation_store::PostgresReservationStore;

use campus_parking_core::error::StoreError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// DDL for the lots, reservations, and event-request tables.
pub const SCHEMA: &str = include_str!("../schema.sql");

/// `PostgreSQL` connection configuration.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections in the pool
    pub min_connections: u32,
    /// Connection acquire timeout in seconds
    pub connect_timeout: u64,
    /// Idle timeout in seconds (idle connections older than this are closed)
    pub idle_timeout: u64,
}

impl PostgresConfig {
    /// Load the configuration from environment variables with defaults.
    ///
    /// Reads `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS`,
    /// `DATABASE_MIN_CONNECTIONS`, `DATABASE_CONNECT_TIMEOUT`, and
    /// `DATABASE_IDLE_TIMEOUT`.
    #[must_use]
    pub fn from_env() -> Self {
        fn var_or<T: std::str::FromStr>(name: &str, default: T) -> T {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        Self {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/parking".to_string()),
            max_connections: var_or("DATABASE_MAX_CONNECTIONS", 10),
            min_connections: var_or("DATABASE_MIN_CONNECTIONS", 1),
            connect_timeout: var_or("DATABASE_CONNECT_TIMEOUT", 5),
            idle_timeout: var_or("DATABASE_IDLE_TIMEOUT", 600),
        }
    }
}

/// Build a connection pool from the configuration.
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] when the database cannot be reached.
pub async fn connect(config: &PostgresConfig) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout))
        .idle_timeout(Duration::from_secs(config.idle_timeout))
        .connect(&config.url)
        .await
        .map_err(|e| StoreError::Unavailable(format!("failed to connect: {e}")))
}

/// Apply `schema.sql` to the connected database.
///
/// Idempotent: every statement is `IF NOT EXISTS`-guarded.
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] when the DDL cannot be executed.
pub async fn apply_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| StoreError::Unavailable(format!("failed to apply schema: {e}")))?;
    tracing::info!("parking schema applied");
    Ok(())
}

/// Map a driver error onto the core's transient-fault class.
pub(crate) fn store_error(err: &sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::TypeNotFound { .. } => {
            StoreError::Serialization(err.to_string())
        }
        _ => StoreError::Unavailable(err.to_string()),
    }
}

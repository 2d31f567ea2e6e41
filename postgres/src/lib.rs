//! Postgres-backed stores for FormGate.
//!
//! [`PgStore`] implements the catalog, ledger, and submission traits over one
//! connection pool. The no-oversell guarantee is a single conditional `UPDATE`
//! per reservation line inside one transaction; the database decides the
//! outcome, never a read-then-write in application code.

use formgate_core::store::StoreError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

mod audit;
mod catalog;
mod ledger;
mod submissions;

pub use audit::PgAuditSink;

/// Postgres implementation of the FormGate store traits.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wraps an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool and runs pending migrations.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` when the connection or a migration fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(backend)?;
        migrator().run(&pool).await.map_err(backend)?;
        Ok(Self { pool })
    }

    /// The underlying pool, for health checks.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// The embedded migration set.
#[must_use]
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

pub(crate) fn backend(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// Converts a non-negative counter column to `u32`.
pub(crate) fn column_u32(value: i32) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Backend(format!("negative counter: {value}")))
}

pub(crate) fn column_u32_opt(value: Option<i32>) -> Result<Option<u32>, StoreError> {
    value.map(column_u32).transpose()
}

/// Converts a quantity or limit to the `INT` column representation.
pub(crate) fn param_i32(value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Backend(format!("quantity too large: {value}")))
}

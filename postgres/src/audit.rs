//! Append-only audit log.

use crate::backend;
use async_trait::async_trait;
use formgate_core::audit::{AuditEvent, AuditSink};
use formgate_core::store::StoreError;
use sqlx::PgPool;

/// Writes audit events to the `audit_log` table.
#[derive(Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    /// Wraps an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO audit_log (id, action, subject, detail, occurred_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(event.id)
        .bind(event.action.as_str())
        .bind(&event.subject)
        .bind(&event.detail)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }
}

//! Shared application state.

use formgate_core::audit::AuditSink;
use formgate_core::clock::Clock;
use formgate_core::intake::IntakePipeline;
use formgate_core::ratelimit::RateLimiter;
use formgate_core::store::{FormCatalog, InventoryLedger, SubmissionStore};
use sqlx::PgPool;
use std::sync::Arc;

/// Everything the handlers share.
///
/// The store fields are trait objects so the HTTP tests run against the
/// in-memory fakes; `db` is present only when the server is backed by
/// Postgres and exists for the readiness check.
#[derive(Clone)]
pub struct AppState {
    /// The public intake pipeline.
    pub pipeline: Arc<IntakePipeline>,
    /// Templates, offerings, bindings.
    pub catalog: Arc<dyn FormCatalog>,
    /// Inventory counters.
    pub ledger: Arc<dyn InventoryLedger>,
    /// Submission rows.
    pub submissions: Arc<dyn SubmissionStore>,
    /// Audit sink for admin actions.
    pub audit: Arc<dyn AuditSink>,
    /// Shared rate limiter.
    pub limiter: Arc<RateLimiter>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Backing pool, when running against Postgres.
    pub db: Option<PgPool>,
}

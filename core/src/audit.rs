//! Best-effort audit events.
//!
//! The sink is an independent, failure-contained seam: the pipeline spawns a
//! task per event and only ever observes failures in a local debug log. Audit
//! emission never adds latency or failure coupling to the caller's response.

use crate::store::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A public submission was accepted.
    SubmissionReceived,
    /// An admin changed a stock limit.
    StockLimitChanged,
    /// An offering was created and provisioned.
    OfferingCreated,
    /// A binding was created.
    BindingCreated,
    /// Stock was reserved but the submission row failed to persist; requires
    /// manual reconciliation.
    ReservationAnomaly,
}

impl AuditAction {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SubmissionReceived => "submission_received",
            Self::StockLimitChanged => "stock_limit_changed",
            Self::OfferingCreated => "offering_created",
            Self::BindingCreated => "binding_created",
            Self::ReservationAnomaly => "reservation_anomaly",
        }
    }
}

/// One audit record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Unique event id.
    pub id: Uuid,
    /// What happened.
    pub action: AuditAction,
    /// Primary subject (submission id, offering id, ...).
    pub subject: String,
    /// Free-form structured detail.
    pub detail: serde_json::Value,
    /// When it happened.
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    /// Builds a new event.
    #[must_use]
    pub fn new(
        action: AuditAction,
        subject: impl Into<String>,
        detail: serde_json::Value,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            subject: subject.into(),
            detail,
            occurred_at,
        }
    }
}

/// Append-only audit destination.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Records one event.
    async fn record(&self, event: AuditEvent) -> Result<(), StoreError>;
}

//! Store traits and error taxonomy at the persistence seam.
//!
//! The pipeline talks to dyn-compatible async traits so the Postgres
//! implementation and the in-memory fakes are interchangeable. Backend faults
//! carry a message for the logs, never for response bodies.

use crate::inventory::{InventoryItem, ProvisionItem, ReservationLine};
use crate::submission::Submission;
use crate::types::{BindingId, ChoiceId, OfferingId, ShareToken, StepId, SubmissionId, TemplateId};
use crate::form::graph::FormTemplate;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Storage/transport fault. Logged internally; callers see a generic message.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backend failed; the message is for logs only.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Outcome of the atomic reserve operation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ReserveError {
    /// At least one line did not fit its stock limit. Nothing was mutated.
    ///
    /// The display form is the public stock-error message verbatim.
    #[error("Not enough stock for {label}. Only {remaining} remaining.")]
    Insufficient {
        /// Label of the first line that did not fit.
        label: String,
        /// Units still available for that line.
        remaining: u32,
    },

    /// The backend failed before the outcome was decided.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of an admin stock-limit edit.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LimitError {
    /// The new limit would undercut units already ordered.
    #[error("limit cannot be set below the {total_ordered} units already ordered")]
    BelowOrdered {
        /// Current counter value.
        total_ordered: u32,
    },

    /// No counter row exists for the key.
    #[error("no inventory item for that key")]
    NotFound,

    /// The backend failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A time-bound offering a template can be bound to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offering {
    /// Unique offering identifier.
    pub id: OfferingId,
    /// Template the offering is built on.
    pub template_id: TemplateId,
    /// Operator-facing name.
    pub name: String,
    /// Unpublished offerings are not publicly reachable.
    pub is_published: bool,
    /// When the offering was created.
    pub created_at: DateTime<Utc>,
}

/// Association of a template with a public share token.
///
/// Three shapes share the type: stage-specific (`offering_id` and `stage`
/// set), offering-level (`offering_id` set, `stage` empty), and legacy
/// template-level (`offering_id` empty).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormBinding {
    /// Unique binding identifier.
    pub id: BindingId,
    /// The public token resolving to this binding.
    pub share_token: ShareToken,
    /// Bound template.
    pub template_id: TemplateId,
    /// Offering the binding belongs to, if any.
    pub offering_id: Option<OfferingId>,
    /// Workflow phase for stage-specific bindings.
    pub stage: Option<String>,
    /// Inactive bindings are not publicly reachable.
    pub is_active: bool,
    /// When the binding was created.
    pub created_at: DateTime<Utc>,
}

/// Everything a share token resolves to: the binding that matched, its
/// template, and the offering when the binding has one.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedForm {
    /// The binding the token matched.
    pub binding: FormBinding,
    /// The bound template.
    pub template: FormTemplate,
    /// The offering, when the binding is offering-level or stage-specific.
    pub offering: Option<Offering>,
}

/// Composite key of one inventory counter row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryKey {
    /// Offering the counter belongs to.
    pub offering_id: OfferingId,
    /// Quantity step within the bound template.
    pub step_id: StepId,
    /// Item within the step.
    pub choice_id: ChoiceId,
}

/// Templates, offerings, bindings, and share-token resolution.
#[async_trait]
pub trait FormCatalog: Send + Sync {
    /// Stores a new template. The graph has already passed validation.
    async fn insert_template(&self, template: &FormTemplate) -> Result<(), StoreError>;

    /// Fetches a template by id.
    async fn template(&self, id: TemplateId) -> Result<Option<FormTemplate>, StoreError>;

    /// Stores a new offering.
    async fn insert_offering(&self, offering: &Offering) -> Result<(), StoreError>;

    /// Fetches an offering by id.
    async fn offering(&self, id: OfferingId) -> Result<Option<Offering>, StoreError>;

    /// Stores a new binding.
    async fn insert_binding(&self, binding: &FormBinding) -> Result<(), StoreError>;

    /// Resolves a share token in priority order: stage-specific binding,
    /// offering-level binding, legacy template-level binding. First match
    /// wins. Availability (active/published) is the caller's concern.
    async fn resolve_share_token(
        &self,
        token: &ShareToken,
    ) -> Result<Option<ResolvedForm>, StoreError>;
}

/// The no-oversell guarantee lives behind this trait.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Idempotent upsert of counter rows; never clobbers existing counters or
    /// admin-edited limits.
    async fn provision(
        &self,
        offering_id: OfferingId,
        items: &[ProvisionItem],
    ) -> Result<(), StoreError>;

    /// Atomically increments `total_ordered` for every line, but only where
    /// the post-increment value fits the stock limit. If any line cannot be
    /// satisfied the whole operation rolls back and no counter changes.
    ///
    /// Implementations must express the check-and-increment as one
    /// conditional storage operation; a separate read followed by a write
    /// reintroduces the oversell race this contract exists to prevent.
    async fn reserve(
        &self,
        offering_id: OfferingId,
        lines: &[ReservationLine],
    ) -> Result<(), ReserveError>;

    /// Bounded limit edit: rejected when the new limit would undercut
    /// `total_ordered`; otherwise applied with no effect on the counter.
    async fn set_limit(&self, key: &InventoryKey, new_limit: Option<u32>)
        -> Result<(), LimitError>;

    /// Read-only list of the offering's counter rows. Never mutates.
    async fn snapshot(&self, offering_id: OfferingId) -> Result<Vec<InventoryItem>, StoreError>;
}

/// Append-only submission rows; only the viewed flag ever changes.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Writes one submission row, exactly once per successful intake.
    async fn insert(&self, submission: &Submission) -> Result<(), StoreError>;

    /// Flips the viewed flag. Returns whether the row existed.
    async fn mark_viewed(&self, id: SubmissionId) -> Result<bool, StoreError>;

    /// Lists submissions for a template, newest first.
    async fn by_template(&self, template_id: TemplateId) -> Result<Vec<Submission>, StoreError>;
}

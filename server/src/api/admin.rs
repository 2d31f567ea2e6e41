//! Operator endpoints: templates, offerings, bindings, inventory, review.

use crate::error::AppError;
use crate::extract::JsonBody;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use formgate_core::audit::{AuditAction, AuditEvent};
use formgate_core::form::graph::{FormGraph, FormTemplate};
use formgate_core::form::traversal::{labelled_answers, LabelledAnswer};
use formgate_core::inventory::{provision_items, InventoryItem};
use formgate_core::store::{FormBinding, InventoryKey, Offering};
use formgate_core::submission::Submission;
use formgate_core::types::{
    BindingId, ChoiceId, OfferingId, ShareToken, StepId, SubmissionId, TemplateId,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// Templates
// ============================================================================

/// `POST /api/admin/templates` payload.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTemplate {
    /// Operator-facing name.
    pub name: String,
    /// The question flow; validated before acceptance.
    pub graph: FormGraph,
}

/// `POST /api/admin/templates`
///
/// Rejects malformed graphs (dangling successors, cycles, empty steps)
/// before anything is stored.
pub async fn create_template(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateTemplate>,
) -> Result<(StatusCode, Json<FormTemplate>), AppError> {
    payload.graph.validate()?;
    let template = FormTemplate {
        id: TemplateId::new(),
        name: payload.name,
        graph: payload.graph,
        created_at: state.clock.now(),
    };
    state.catalog.insert_template(&template).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

/// `POST /api/admin/templates/:id/share` response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareResponse {
    /// The minted binding.
    pub binding: FormBinding,
}

/// `POST /api/admin/templates/:id/share`
///
/// Mints a legacy template-level binding: publicly reachable, no offering,
/// no inventory enforcement.
pub async fn share_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ShareResponse>), AppError> {
    let template_id = TemplateId::from_uuid(id);
    if state.catalog.template(template_id).await?.is_none() {
        return Err(AppError::not_found("template not found"));
    }

    let binding = FormBinding {
        id: BindingId::new(),
        share_token: ShareToken::generate(),
        template_id,
        offering_id: None,
        stage: None,
        is_active: true,
        created_at: state.clock.now(),
    };
    state.catalog.insert_binding(&binding).await?;
    dispatch_audit(
        &state,
        AuditAction::BindingCreated,
        binding.id.to_string(),
        json!({ "templateId": template_id, "stage": null }),
    );
    Ok((StatusCode::CREATED, Json(ShareResponse { binding })))
}

/// `GET /api/admin/templates/:id/submissions` row.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionView {
    /// The raw submission.
    #[serde(flatten)]
    pub submission: Submission,
    /// Answers rendered against the template's questions, in path order.
    pub labelled: Vec<LabelledAnswer>,
}

/// `GET /api/admin/templates/:id/submissions`
///
/// Newest first, each with its answers rendered back to question labels.
pub async fn list_submissions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<SubmissionView>>, AppError> {
    let template_id = TemplateId::from_uuid(id);
    let Some(template) = state.catalog.template(template_id).await? else {
        return Err(AppError::not_found("template not found"));
    };

    let rows = state.submissions.by_template(template_id).await?;
    let views = rows
        .into_iter()
        .map(|submission| {
            let labelled = labelled_answers(&template.graph, &submission.answers);
            SubmissionView {
                submission,
                labelled,
            }
        })
        .collect();
    Ok(Json(views))
}

/// `POST /api/admin/submissions/:id/viewed`
pub async fn mark_viewed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let found = state
        .submissions
        .mark_viewed(SubmissionId::from_uuid(id))
        .await?;
    if found {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("submission not found"))
    }
}

// ============================================================================
// Offerings and bindings
// ============================================================================

/// `POST /api/admin/offerings` payload.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOffering {
    /// Template the offering is built on.
    pub template_id: TemplateId,
    /// Operator-facing name.
    pub name: String,
    /// Whether the offering is publicly reachable immediately.
    #[serde(default)]
    pub is_published: bool,
}

/// `POST /api/admin/offerings` response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferingResponse {
    /// The created offering.
    pub offering: Offering,
    /// Its offering-level binding.
    pub binding: FormBinding,
}

/// `POST /api/admin/offerings`
///
/// Creates the offering, mints its offering-level binding, and provisions
/// inventory rows from the template's quantity items.
pub async fn create_offering(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateOffering>,
) -> Result<(StatusCode, Json<OfferingResponse>), AppError> {
    let Some(template) = state.catalog.template(payload.template_id).await? else {
        return Err(AppError::not_found("template not found"));
    };

    let now = state.clock.now();
    let offering = Offering {
        id: OfferingId::new(),
        template_id: template.id,
        name: payload.name,
        is_published: payload.is_published,
        created_at: now,
    };
    state.catalog.insert_offering(&offering).await?;
    state
        .ledger
        .provision(offering.id, &provision_items(&template.graph))
        .await?;

    let binding = FormBinding {
        id: BindingId::new(),
        share_token: ShareToken::generate(),
        template_id: template.id,
        offering_id: Some(offering.id),
        stage: None,
        is_active: true,
        created_at: now,
    };
    state.catalog.insert_binding(&binding).await?;

    dispatch_audit(
        &state,
        AuditAction::OfferingCreated,
        offering.id.to_string(),
        json!({ "templateId": template.id, "name": offering.name }),
    );
    Ok((
        StatusCode::CREATED,
        Json(OfferingResponse { offering, binding }),
    ))
}

/// `POST /api/admin/bindings` payload.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBinding {
    /// Offering the binding belongs to.
    pub offering_id: OfferingId,
    /// Workflow phase label, e.g. `"deposit"`.
    pub stage: Option<String>,
    /// Whether the binding is publicly reachable immediately.
    #[serde(default = "default_active")]
    pub is_active: bool,
}

const fn default_active() -> bool {
    true
}

/// `POST /api/admin/bindings`
///
/// Mints a stage-specific binding for an offering and re-provisions so items
/// added to the template since offering creation get counter rows. Existing
/// counters are untouched.
pub async fn create_binding(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateBinding>,
) -> Result<(StatusCode, Json<FormBinding>), AppError> {
    let Some(offering) = state.catalog.offering(payload.offering_id).await? else {
        return Err(AppError::not_found("offering not found"));
    };
    let Some(template) = state.catalog.template(offering.template_id).await? else {
        return Err(AppError::not_found("template not found"));
    };

    state
        .ledger
        .provision(offering.id, &provision_items(&template.graph))
        .await?;

    let binding = FormBinding {
        id: BindingId::new(),
        share_token: ShareToken::generate(),
        template_id: template.id,
        offering_id: Some(offering.id),
        stage: payload.stage,
        is_active: payload.is_active,
        created_at: state.clock.now(),
    };
    state.catalog.insert_binding(&binding).await?;

    dispatch_audit(
        &state,
        AuditAction::BindingCreated,
        binding.id.to_string(),
        json!({ "offeringId": offering.id, "stage": binding.stage }),
    );
    Ok((StatusCode::CREATED, Json(binding)))
}

// ============================================================================
// Inventory
// ============================================================================

/// `GET /api/admin/offerings/:id/inventory` row: the full counter plus the
/// derived availability the public snapshot exposes.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRow {
    /// The raw counter row.
    #[serde(flatten)]
    pub item: InventoryItem,
    /// Units still available (`None` = unbounded).
    pub remaining: Option<u32>,
    /// Whether the item can take no further orders.
    pub is_sold_out: bool,
}

/// `GET /api/admin/offerings/:id/inventory`
///
/// The full counter rows, limits and totals included. The public snapshot
/// exposes only remaining counts.
pub async fn offering_inventory(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<InventoryRow>>, AppError> {
    let offering_id = OfferingId::from_uuid(id);
    if state.catalog.offering(offering_id).await?.is_none() {
        return Err(AppError::not_found("offering not found"));
    }
    let rows = state
        .ledger
        .snapshot(offering_id)
        .await?
        .into_iter()
        .map(|item| InventoryRow {
            remaining: item.remaining(),
            is_sold_out: item.is_sold_out(),
            item,
        })
        .collect();
    Ok(Json(rows))
}

/// `PUT /api/admin/inventory/limit` payload.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetLimit {
    /// Offering the counter belongs to.
    pub offering_id: OfferingId,
    /// Quantity step within the bound template.
    pub step_id: StepId,
    /// Item within the step.
    pub choice_id: ChoiceId,
    /// New ceiling; `null` removes the limit.
    pub stock_limit: Option<u32>,
}

/// `PUT /api/admin/inventory/limit`
///
/// Rejected when the new limit would undercut units already ordered.
pub async fn set_limit(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<SetLimit>,
) -> Result<StatusCode, AppError> {
    let key = InventoryKey {
        offering_id: payload.offering_id,
        step_id: payload.step_id,
        choice_id: payload.choice_id,
    };
    state.ledger.set_limit(&key, payload.stock_limit).await?;

    dispatch_audit(
        &state,
        AuditAction::StockLimitChanged,
        payload.offering_id.to_string(),
        json!({ "key": key, "stockLimit": payload.stock_limit }),
    );
    Ok(StatusCode::NO_CONTENT)
}

/// Fire-and-forget audit for admin actions; failures are logged, never
/// surfaced.
fn dispatch_audit(
    state: &AppState,
    action: AuditAction,
    subject: String,
    detail: serde_json::Value,
) {
    let sink = Arc::clone(&state.audit);
    let event = AuditEvent::new(action, subject, detail, state.clock.now());
    tokio::spawn(async move {
        if let Err(err) = sink.record(event).await {
            tracing::debug!(error = %err, action = action.as_str(), "audit event dropped");
        }
    });
}

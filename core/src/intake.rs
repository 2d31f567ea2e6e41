//! The submission intake pipeline.
//!
//! A linear state machine with one conditional branch and no internal
//! retries: rate gate, context resolution, validation, inventory reservation,
//! persistence, best-effort audit, respond. Steps before persistence are pure
//! rejections with no side effects; a failed reservation guarantees zero
//! partial stock consumption, so callers may safely retry.

use crate::audit::{AuditAction, AuditEvent, AuditSink};
use crate::clock::Clock;
use crate::form::graph::{FormGraph, Step};
use crate::form::traversal::AnswerValue;
use crate::inventory::{ReservationLine, StockLevel};
use crate::ratelimit::{RateLimited, RateLimiter, RatePurpose};
use crate::store::{
    FormCatalog, InventoryLedger, ResolvedForm, ReserveError, StoreError, SubmissionStore,
};
use crate::submission::{self, Submission, SubmitRequest, ValidationError};
use crate::types::{ShareToken, StepId, SubmissionId, TemplateId};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Everything that can stop an intake. Ordering of the pipeline fixes the
/// side-effect guarantees per variant.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum IntakeError {
    /// Malformed payload. No side effects.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The share token resolved to nothing. No side effects, but the rate
    /// gate already counted the call.
    #[error("form not found")]
    NotFound,

    /// The token resolved to an inactive binding or unpublished offering.
    #[error("form not available")]
    NotAvailable,

    /// A named item is short on stock. Guaranteed no partial mutation.
    #[error("Not enough stock for {label}. Only {remaining} remaining.")]
    InsufficientStock {
        /// Label of the item that did not fit.
        label: String,
        /// Units still available.
        remaining: u32,
    },

    /// The caller is over budget. No downstream work was performed.
    #[error(transparent)]
    RateLimited(#[from] RateLimited),

    /// Storage fault. Callers may retry: no partial state was committed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ReserveError> for IntakeError {
    fn from(err: ReserveError) -> Self {
        match err {
            ReserveError::Insufficient { label, remaining } => {
                Self::InsufficientStock { label, remaining }
            }
            ReserveError::Store(store) => Self::Store(store),
        }
    }
}

/// Resolved form plus live stock, as the public read path returns it.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormView {
    /// Template the token resolved to.
    pub template_id: TemplateId,
    /// Template name.
    pub template_name: String,
    /// The question flow.
    pub graph: FormGraph,
    /// Live stock levels; empty for legacy template-level bindings.
    pub inventory: Vec<StockLevel>,
}

/// Orchestrates public intake against the store seams.
pub struct IntakePipeline {
    catalog: Arc<dyn FormCatalog>,
    ledger: Arc<dyn InventoryLedger>,
    submissions: Arc<dyn SubmissionStore>,
    audit: Arc<dyn AuditSink>,
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
}

impl IntakePipeline {
    /// Wires the pipeline to its collaborators.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn FormCatalog>,
        ledger: Arc<dyn InventoryLedger>,
        submissions: Arc<dyn SubmissionStore>,
        audit: Arc<dyn AuditSink>,
        limiter: Arc<RateLimiter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            submissions,
            audit,
            limiter,
            clock,
        }
    }

    /// Accepts one public submission.
    ///
    /// # Errors
    ///
    /// See [`IntakeError`]; every failure before persistence leaves no side
    /// effects beyond the rate-gate count.
    pub async fn submit(
        &self,
        token: &ShareToken,
        caller_ip: &str,
        request: SubmitRequest,
    ) -> Result<Submission, IntakeError> {
        // 1. Rate gate runs first: invalid tokens still consume budget.
        self.limiter.check(RatePurpose::PublicSubmission, caller_ip)?;

        // 2. Resolve the share token.
        let resolved = self.resolve(token).await?;

        // 3. Validate and normalize the payload.
        submission::validate_phone(&request.customer_phone)?;
        let answers = submission::validate_answers(&resolved.template.graph, request.answers)?;

        // 4. Reserve inventory, only when there is something to reserve and
        //    the context has an offering. Legacy template-level bindings have
        //    no counters; their quantity answers persist as data.
        let lines = reservation_lines(&resolved.template.graph, &answers);
        let reserved = if lines.is_empty() {
            false
        } else if let Some(offering) = &resolved.offering {
            self.ledger.reserve(offering.id, &lines).await?;
            true
        } else {
            false
        };

        // 5. Persist exactly one row.
        let submission = Submission {
            id: SubmissionId::new(),
            template_id: resolved.template.id,
            offering_id: resolved.offering.as_ref().map(|o| o.id),
            binding_id: Some(resolved.binding.id),
            answers,
            customer_name: request.customer_name,
            customer_phone: request.customer_phone,
            is_viewed: false,
            created_at: self.clock.now(),
        };

        if let Err(err) = self.submissions.insert(&submission).await {
            if reserved {
                // Reserved stock with no submission row behind it: a
                // reportable anomaly requiring manual reconciliation, never
                // silently lost.
                let offering_id = resolved.offering.as_ref().map(|o| o.id);
                tracing::error!(
                    offering_id = ?offering_id,
                    lines = ?lines,
                    error = %err,
                    "submission persist failed after successful reservation"
                );
                self.dispatch_audit(
                    AuditAction::ReservationAnomaly,
                    submission.id.to_string(),
                    json!({
                        "offeringId": offering_id,
                        "lines": lines,
                    }),
                );
            }
            return Err(IntakeError::Store(err));
        }

        // 6. Best-effort audit, decoupled from the response.
        self.dispatch_audit(
            AuditAction::SubmissionReceived,
            submission.id.to_string(),
            json!({
                "templateId": submission.template_id,
                "offeringId": submission.offering_id,
                "bindingId": submission.binding_id,
            }),
        );

        // 7. Respond.
        Ok(submission)
    }

    /// Resolves a token to the form graph plus a live inventory snapshot.
    ///
    /// # Errors
    ///
    /// `NotFound`/`NotAvailable` per the resolution rules; `Store` on backend
    /// faults. Never mutates anything.
    pub async fn form_view(&self, token: &ShareToken) -> Result<FormView, IntakeError> {
        let resolved = self.resolve(token).await?;
        let inventory = self.stock_levels(&resolved).await?;
        Ok(FormView {
            template_id: resolved.template.id,
            template_name: resolved.template.name,
            graph: resolved.template.graph,
            inventory,
        })
    }

    /// Resolves a token to just the inventory snapshot, for cheap polling.
    ///
    /// # Errors
    ///
    /// Same as [`Self::form_view`].
    pub async fn inventory_view(&self, token: &ShareToken) -> Result<Vec<StockLevel>, IntakeError> {
        let resolved = self.resolve(token).await?;
        self.stock_levels(&resolved).await
    }

    async fn resolve(&self, token: &ShareToken) -> Result<ResolvedForm, IntakeError> {
        let resolved = self
            .catalog
            .resolve_share_token(token)
            .await?
            .ok_or(IntakeError::NotFound)?;
        if !resolved.binding.is_active {
            return Err(IntakeError::NotAvailable);
        }
        if let Some(offering) = &resolved.offering {
            if !offering.is_published {
                return Err(IntakeError::NotAvailable);
            }
        }
        Ok(resolved)
    }

    async fn stock_levels(&self, resolved: &ResolvedForm) -> Result<Vec<StockLevel>, IntakeError> {
        let Some(offering) = &resolved.offering else {
            return Ok(Vec::new());
        };
        let items = self.ledger.snapshot(offering.id).await?;
        Ok(items.iter().map(StockLevel::from).collect())
    }

    /// Fire-and-forget audit dispatch. Failures are logged at debug and
    /// discarded; they never surface to the caller.
    fn dispatch_audit(&self, action: AuditAction, subject: String, detail: serde_json::Value) {
        let sink = Arc::clone(&self.audit);
        let event = AuditEvent::new(action, subject, detail, self.clock.now());
        tokio::spawn(async move {
            if let Err(err) = sink.record(event).await {
                tracing::debug!(error = %err, action = action.as_str(), "audit event dropped");
            }
        });
    }
}

/// Collects the reservation lines from a normalized answer set: every
/// quantity line with `quantity > 0` whose item is not excluded from
/// inventory.
#[must_use]
pub fn reservation_lines(
    graph: &FormGraph,
    answers: &BTreeMap<StepId, AnswerValue>,
) -> Vec<ReservationLine> {
    let mut lines = Vec::new();
    for (step_id, answer) in answers {
        let AnswerValue::Quantities(entries) = answer else {
            continue;
        };
        let Some(Step::Quantity { items, .. }) = graph.step(step_id) else {
            continue;
        };
        for entry in entries {
            if entry.quantity == 0 {
                continue;
            }
            let excluded = items
                .iter()
                .find(|i| i.choice_id == entry.choice_id)
                .is_some_and(|i| i.excluded_from_inventory);
            if excluded {
                continue;
            }
            lines.push(ReservationLine {
                step_id: step_id.clone(),
                choice_id: entry.choice_id.clone(),
                quantity: entry.quantity,
                label: entry.label.clone(),
                price: entry.price,
            });
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::graph::QuantityItem;
    use crate::form::traversal::QuantityAnswer;
    use crate::types::ChoiceId;

    fn graph() -> FormGraph {
        FormGraph {
            root_step_id: StepId::new("addons"),
            steps: [(
                StepId::new("addons"),
                Step::Quantity {
                    question: "Add-ons?".to_string(),
                    items: vec![
                        QuantityItem {
                            choice_id: ChoiceId::new("kayak"),
                            label: "Kayak Tour".to_string(),
                            price: 4500,
                            limit: Some(2),
                            excluded_from_inventory: false,
                        },
                        QuantityItem {
                            choice_id: ChoiceId::new("donation"),
                            label: "Donation".to_string(),
                            price: 1000,
                            limit: None,
                            excluded_from_inventory: true,
                        },
                    ],
                    next_step_id: None,
                },
            )]
            .into_iter()
            .collect(),
        }
    }

    fn quantity(choice: &str, label: &str, quantity: u32) -> QuantityAnswer {
        QuantityAnswer {
            choice_id: ChoiceId::new(choice),
            label: label.to_string(),
            quantity,
            price: 4500,
        }
    }

    #[test]
    fn lines_skip_zero_and_excluded() {
        let answers: BTreeMap<StepId, AnswerValue> = [(
            StepId::new("addons"),
            AnswerValue::Quantities(vec![
                quantity("kayak", "Kayak Tour", 2),
                quantity("kayak", "Kayak Tour", 0),
                quantity("donation", "Donation", 3),
            ]),
        )]
        .into_iter()
        .collect();

        let lines = reservation_lines(&graph(), &answers);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].choice_id, ChoiceId::new("kayak"));
        assert_eq!(lines[0].quantity, 2);
    }

    #[test]
    fn scalar_answers_produce_no_lines() {
        let answers: BTreeMap<StepId, AnswerValue> =
            [(StepId::new("addons"), AnswerValue::Scalar("x".to_string()))]
                .into_iter()
                .collect();
        assert!(reservation_lines(&graph(), &answers).is_empty());
    }
}

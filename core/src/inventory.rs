//! Inventory ledger model: per-offering, per-choice stock counters.
//!
//! This module holds the pure arithmetic; the mutation contract (the atomic
//! conditional reserve) lives behind [`crate::store::InventoryLedger`].

use crate::form::graph::{FormGraph, Step};
use crate::types::{ChoiceId, OfferingId, StepId};
use serde::{Deserialize, Serialize};

/// One stock counter row, keyed by `(offering_id, step_id, choice_id)`.
///
/// Invariant: `stock_limit == None || total_ordered <= stock_limit`, enforced
/// at every mutation by the ledger's conditional update, never
/// checked-then-trusted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    /// Offering the counter belongs to.
    pub offering_id: OfferingId,
    /// Quantity step within the bound template.
    pub step_id: StepId,
    /// Item within the quantity step.
    pub choice_id: ChoiceId,
    /// Item label at provisioning time.
    pub label: String,
    /// Unit price in minor units.
    pub price: i64,
    /// Units ordered so far; monotonically non-decreasing except via explicit
    /// admin correction.
    pub total_ordered: u32,
    /// Stock ceiling (`None` = unbounded).
    pub stock_limit: Option<u32>,
}

impl InventoryItem {
    /// Units still available: `None` when unbounded, otherwise
    /// `max(0, limit - total_ordered)`.
    #[must_use]
    pub const fn remaining(&self) -> Option<u32> {
        match self.stock_limit {
            None => None,
            Some(limit) => Some(limit.saturating_sub(self.total_ordered)),
        }
    }

    /// Whether the item can take no further orders.
    #[must_use]
    pub const fn is_sold_out(&self) -> bool {
        match self.stock_limit {
            None => false,
            Some(limit) => self.total_ordered >= limit,
        }
    }
}

/// Seed row for provisioning, scanned out of a template's quantity steps.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionItem {
    /// Quantity step within the template.
    pub step_id: StepId,
    /// Item within the step.
    pub choice_id: ChoiceId,
    /// Item label.
    pub label: String,
    /// Unit price in minor units.
    pub price: i64,
    /// Seed limit from the item declaration.
    pub stock_limit: Option<u32>,
}

/// Scans a graph for the inventory rows an offering bound to it needs.
///
/// One row per quantity item that is not excluded from inventory. Called when
/// an offering or a stage-specific binding is created; the resulting upsert is
/// idempotent so repeated binding creation never clobbers counters.
#[must_use]
pub fn provision_items(graph: &FormGraph) -> Vec<ProvisionItem> {
    let mut rows = Vec::new();
    for (step_id, step) in &graph.steps {
        if let Step::Quantity { items, .. } = step {
            for item in items {
                if item.excluded_from_inventory {
                    continue;
                }
                rows.push(ProvisionItem {
                    step_id: step_id.clone(),
                    choice_id: item.choice_id.clone(),
                    label: item.label.clone(),
                    price: item.price,
                    stock_limit: item.limit,
                });
            }
        }
    }
    rows
}

/// One line of a reservation request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationLine {
    /// Quantity step the item belongs to.
    pub step_id: StepId,
    /// Item being reserved.
    pub choice_id: ChoiceId,
    /// Requested units; always > 0 by construction.
    pub quantity: u32,
    /// Item label, used in the insufficient-stock message.
    pub label: String,
    /// Unit price, used when the ledger self-heals a missing row.
    pub price: i64,
}

/// Public stock view for one item, derived from a snapshot. Reads never
/// mutate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
    /// Quantity step the item belongs to.
    pub step_id: StepId,
    /// Item id.
    pub choice_id: ChoiceId,
    /// Units still available (`None` = unbounded).
    pub remaining: Option<u32>,
    /// Whether the item can take no further orders.
    pub is_sold_out: bool,
}

impl From<&InventoryItem> for StockLevel {
    fn from(item: &InventoryItem) -> Self {
        Self {
            step_id: item.step_id.clone(),
            choice_id: item.choice_id.clone(),
            remaining: item.remaining(),
            is_sold_out: item.is_sold_out(),
        }
    }
}

//! Answer-driven traversal over a form graph.
//!
//! Traversal follows the path the respondent actually took: linear and
//! quantity steps follow their single successor, choice steps follow the
//! option matched by the given answer, and the walk stops at a terminal step,
//! a missing successor, or an unanswered branch. A visited guard keeps the
//! walk total even on a malformed graph.

use super::graph::{FormGraph, Step};
use crate::types::{ChoiceId, StepId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One ordered line of a quantity answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityAnswer {
    /// Which item was ordered.
    pub choice_id: ChoiceId,
    /// Item label at submission time (normalized from the template).
    pub label: String,
    /// Ordered quantity.
    pub quantity: u32,
    /// Unit price in minor units at submission time.
    pub price: i64,
}

/// A submitted answer for one step: a scalar for linear/choice steps, a list
/// of ordered items for quantity steps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    /// Free-text or selected-option answer.
    Scalar(String),
    /// Ordered quantity lines.
    Quantities(Vec<QuantityAnswer>),
}

/// Walks the graph from the root, driven by the given answers.
///
/// Returns the visited step ids in order. The walk ends at a terminal step, a
/// `None` successor, an unmatched or missing choice answer, a dangling
/// successor reference, or a repeated step.
#[must_use]
pub fn walk<'g>(graph: &'g FormGraph, answers: &BTreeMap<StepId, AnswerValue>) -> Vec<&'g StepId> {
    let mut path = Vec::new();
    let mut visited = BTreeSet::new();
    let mut current = Some(&graph.root_step_id);

    while let Some(step_id) = current {
        let Some((key, step)) = graph.steps.get_key_value(step_id) else {
            break;
        };
        if !visited.insert(key) {
            break;
        }
        path.push(key);

        current = match step {
            Step::Linear { next_step_id, .. } | Step::Quantity { next_step_id, .. } => {
                next_step_id.as_ref()
            }
            Step::Choice { options, .. } => match answers.get(key) {
                Some(AnswerValue::Scalar(picked)) => options
                    .iter()
                    .find(|o| o.id.as_str() == picked || o.label == *picked)
                    .and_then(|o| o.next_step_id.as_ref()),
                _ => None,
            },
            Step::Terminal { .. } => None,
        };
    }

    path
}

/// An answer mapped back to its question, in traversal order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelledAnswer {
    /// Step the answer belongs to.
    pub step_id: StepId,
    /// Question text from the template.
    pub question: String,
    /// Human-readable rendering of the answer.
    pub rendered: String,
}

/// Maps an answer set back to question labels along the path the respondent
/// took. Export and audit consume this shape.
///
/// A quantity answer renders as its non-zero lines joined with `", "`, e.g.
/// `"2× Kayak Tour, 1× Lunch"`. Steps without an answer are skipped.
#[must_use]
pub fn labelled_answers(
    graph: &FormGraph,
    answers: &BTreeMap<StepId, AnswerValue>,
) -> Vec<LabelledAnswer> {
    walk(graph, answers)
        .into_iter()
        .filter_map(|step_id| {
            let step = graph.steps.get(step_id)?;
            let question = step.question()?;
            let rendered = match answers.get(step_id)? {
                AnswerValue::Scalar(text) => text.clone(),
                AnswerValue::Quantities(lines) => {
                    let parts: Vec<String> = lines
                        .iter()
                        .filter(|line| line.quantity > 0)
                        .map(|line| format!("{}× {}", line.quantity, line.label))
                        .collect();
                    if parts.is_empty() {
                        return None;
                    }
                    parts.join(", ")
                }
            };
            Some(LabelledAnswer {
                step_id: step_id.clone(),
                question: question.to_string(),
                rendered,
            })
        })
        .collect()
}

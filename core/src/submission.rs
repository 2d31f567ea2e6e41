//! Submission records and answer-payload validation.
//!
//! Validation is shape-checking against the template's step kinds plus the
//! phone rule. Caller-supplied labels and prices in quantity answers are not
//! trusted: they are replaced by the template's authoritative values during
//! normalization.

use crate::form::graph::{FormGraph, Step};
use crate::form::traversal::{AnswerValue, QuantityAnswer};
use crate::types::{BindingId, ChoiceId, OfferingId, StepId, SubmissionId, TemplateId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Upper bound on a single quantity line. Keeps payloads sane and the i32
/// column arithmetic trivially safe.
pub const MAX_LINE_QUANTITY: u32 = 1000;

/// Minimum digits a customer phone must contain after stripping non-digits.
pub const MIN_PHONE_DIGITS: usize = 7;

/// One public intake record. Immutable after creation except `is_viewed`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    /// Unique submission identifier.
    pub id: SubmissionId,
    /// Template the answers were validated against.
    pub template_id: TemplateId,
    /// Offering the submission was made under, when the binding has one.
    pub offering_id: Option<OfferingId>,
    /// Binding the share token resolved to.
    pub binding_id: Option<BindingId>,
    /// Normalized answers, keyed by step id.
    pub answers: BTreeMap<StepId, AnswerValue>,
    /// Optional customer name.
    pub customer_name: Option<String>,
    /// Customer phone, required.
    pub customer_phone: String,
    /// The one mutable flag: whether an operator has viewed the submission.
    pub is_viewed: bool,
    /// When the submission was created.
    pub created_at: DateTime<Utc>,
}

/// Public submit payload.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    /// Answers keyed by step id.
    pub answers: BTreeMap<StepId, AnswerValue>,
    /// Optional customer name.
    #[serde(default)]
    pub customer_name: Option<String>,
    /// Customer phone, required.
    pub customer_phone: String,
}

/// Malformed-payload rejections. No side effects have occurred when one of
/// these is returned.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// An answer references a step the template does not contain.
    #[error("unknown step '{0}'")]
    UnknownStep(StepId),

    /// Linear and choice steps take a single text answer.
    #[error("step '{0}' expects a text answer")]
    ExpectedScalar(StepId),

    /// Quantity steps take a list of ordered items.
    #[error("step '{0}' expects a list of ordered items")]
    ExpectedQuantities(StepId),

    /// Terminal steps take no answer.
    #[error("step '{0}' does not take an answer")]
    UnexpectedAnswer(StepId),

    /// A quantity line references an item the step does not offer.
    #[error("step '{step_id}' has no item '{choice_id}'")]
    UnknownChoice {
        /// The quantity step.
        step_id: StepId,
        /// The unknown item id.
        choice_id: ChoiceId,
    },

    /// A quantity answer lists the same item more than once.
    #[error("step '{step_id}' lists item '{choice_id}' more than once")]
    DuplicateLine {
        /// The quantity step.
        step_id: StepId,
        /// The repeated item id.
        choice_id: ChoiceId,
    },

    /// A quantity line exceeds the per-line bound.
    #[error("quantity for '{choice_id}' exceeds the maximum of {max}")]
    QuantityTooLarge {
        /// The offending item id.
        choice_id: ChoiceId,
        /// The bound that was exceeded.
        max: u32,
    },

    /// The customer phone is missing or has too few digits.
    #[error("a phone number with at least {MIN_PHONE_DIGITS} digits is required")]
    InvalidPhone,
}

/// Validates and normalizes an answer map against the template graph.
///
/// Shape rules per step kind: linear and choice steps take a scalar, quantity
/// steps take a list whose choice ids must belong to the step and appear at
/// most once, terminal steps take nothing. Labels and prices on quantity lines are replaced by the
/// template's values; quantities are bounded by [`MAX_LINE_QUANTITY`].
///
/// # Errors
///
/// Returns the first [`ValidationError`] found.
pub fn validate_answers(
    graph: &FormGraph,
    answers: BTreeMap<StepId, AnswerValue>,
) -> Result<BTreeMap<StepId, AnswerValue>, ValidationError> {
    let mut normalized = BTreeMap::new();

    for (step_id, answer) in answers {
        let Some(step) = graph.step(&step_id) else {
            return Err(ValidationError::UnknownStep(step_id));
        };

        let value = match (step, answer) {
            (Step::Linear { .. } | Step::Choice { .. }, AnswerValue::Scalar(text)) => {
                AnswerValue::Scalar(text)
            }
            (Step::Linear { .. } | Step::Choice { .. }, AnswerValue::Quantities(_)) => {
                return Err(ValidationError::ExpectedScalar(step_id));
            }
            (Step::Quantity { items, .. }, AnswerValue::Quantities(lines)) => {
                let mut checked = Vec::with_capacity(lines.len());
                let mut seen = std::collections::BTreeSet::new();
                for line in lines {
                    let Some(item) = items.iter().find(|i| i.choice_id == line.choice_id) else {
                        return Err(ValidationError::UnknownChoice {
                            step_id,
                            choice_id: line.choice_id,
                        });
                    };
                    if !seen.insert(line.choice_id.clone()) {
                        return Err(ValidationError::DuplicateLine {
                            step_id,
                            choice_id: line.choice_id,
                        });
                    }
                    if line.quantity > MAX_LINE_QUANTITY {
                        return Err(ValidationError::QuantityTooLarge {
                            choice_id: line.choice_id,
                            max: MAX_LINE_QUANTITY,
                        });
                    }
                    checked.push(QuantityAnswer {
                        choice_id: item.choice_id.clone(),
                        label: item.label.clone(),
                        quantity: line.quantity,
                        price: item.price,
                    });
                }
                AnswerValue::Quantities(checked)
            }
            (Step::Quantity { .. }, AnswerValue::Scalar(_)) => {
                return Err(ValidationError::ExpectedQuantities(step_id));
            }
            (Step::Terminal { .. }, _) => {
                return Err(ValidationError::UnexpectedAnswer(step_id));
            }
        };

        normalized.insert(step_id, value);
    }

    Ok(normalized)
}

/// Checks the customer-phone rule: at least [`MIN_PHONE_DIGITS`] digits after
/// removing non-digit characters.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidPhone`] when the rule is not met.
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    if digits < MIN_PHONE_DIGITS {
        return Err(ValidationError::InvalidPhone);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::graph::QuantityItem;

    fn graph() -> FormGraph {
        FormGraph {
            root_step_id: StepId::new("name"),
            steps: [
                (
                    StepId::new("name"),
                    Step::Linear {
                        question: "Your name?".to_string(),
                        next_step_id: Some(StepId::new("addons")),
                    },
                ),
                (
                    StepId::new("addons"),
                    Step::Quantity {
                        question: "Add-ons?".to_string(),
                        items: vec![QuantityItem {
                            choice_id: ChoiceId::new("kayak"),
                            label: "Kayak Tour".to_string(),
                            price: 4500,
                            limit: Some(2),
                            excluded_from_inventory: false,
                        }],
                        next_step_id: Some(StepId::new("done")),
                    },
                ),
                (
                    StepId::new("done"),
                    Step::Terminal {
                        thank_you_message: "Thanks!".to_string(),
                        submit_label: "Send".to_string(),
                    },
                ),
            ]
            .into_iter()
            .collect(),
        }
    }

    #[test]
    fn normalizes_label_and_price_from_template() {
        let answers: BTreeMap<StepId, AnswerValue> = [(
            StepId::new("addons"),
            AnswerValue::Quantities(vec![QuantityAnswer {
                choice_id: ChoiceId::new("kayak"),
                label: "totally free kayak".to_string(),
                quantity: 1,
                price: 0,
            }]),
        )]
        .into_iter()
        .collect();

        let normalized = validate_answers(&graph(), answers).expect("valid");
        let AnswerValue::Quantities(lines) = &normalized[&StepId::new("addons")] else {
            panic!("expected quantities");
        };
        assert_eq!(lines[0].label, "Kayak Tour");
        assert_eq!(lines[0].price, 4500);
    }

    #[test]
    fn rejects_unknown_step_and_choice() {
        let unknown_step: BTreeMap<StepId, AnswerValue> =
            [(StepId::new("ghost"), AnswerValue::Scalar("x".to_string()))]
                .into_iter()
                .collect();
        assert_eq!(
            validate_answers(&graph(), unknown_step),
            Err(ValidationError::UnknownStep(StepId::new("ghost")))
        );

        let unknown_choice: BTreeMap<StepId, AnswerValue> = [(
            StepId::new("addons"),
            AnswerValue::Quantities(vec![QuantityAnswer {
                choice_id: ChoiceId::new("submarine"),
                label: String::new(),
                quantity: 1,
                price: 0,
            }]),
        )]
        .into_iter()
        .collect();
        assert!(matches!(
            validate_answers(&graph(), unknown_choice),
            Err(ValidationError::UnknownChoice { .. })
        ));
    }

    #[test]
    fn rejects_wrong_shapes() {
        let scalar_for_quantity: BTreeMap<StepId, AnswerValue> =
            [(StepId::new("addons"), AnswerValue::Scalar("2".to_string()))]
                .into_iter()
                .collect();
        assert_eq!(
            validate_answers(&graph(), scalar_for_quantity),
            Err(ValidationError::ExpectedQuantities(StepId::new("addons")))
        );

        let answer_for_terminal: BTreeMap<StepId, AnswerValue> =
            [(StepId::new("done"), AnswerValue::Scalar("bye".to_string()))]
                .into_iter()
                .collect();
        assert_eq!(
            validate_answers(&graph(), answer_for_terminal),
            Err(ValidationError::UnexpectedAnswer(StepId::new("done")))
        );
    }

    #[test]
    fn rejects_repeated_lines_for_one_item() {
        let line = QuantityAnswer {
            choice_id: ChoiceId::new("kayak"),
            label: String::new(),
            quantity: 1,
            price: 0,
        };
        let answers: BTreeMap<StepId, AnswerValue> = [(
            StepId::new("addons"),
            AnswerValue::Quantities(vec![line.clone(), line]),
        )]
        .into_iter()
        .collect();
        assert_eq!(
            validate_answers(&graph(), answers),
            Err(ValidationError::DuplicateLine {
                step_id: StepId::new("addons"),
                choice_id: ChoiceId::new("kayak"),
            })
        );
    }

    #[test]
    fn rejects_oversized_quantity() {
        let answers: BTreeMap<StepId, AnswerValue> = [(
            StepId::new("addons"),
            AnswerValue::Quantities(vec![QuantityAnswer {
                choice_id: ChoiceId::new("kayak"),
                label: String::new(),
                quantity: MAX_LINE_QUANTITY + 1,
                price: 0,
            }]),
        )]
        .into_iter()
        .collect();
        assert!(matches!(
            validate_answers(&graph(), answers),
            Err(ValidationError::QuantityTooLarge { .. })
        ));
    }

    #[test]
    fn phone_rule_strips_non_digits() {
        assert!(validate_phone("+1 (555) 867-5309").is_ok());
        assert!(validate_phone("555-1234").is_ok());
        assert_eq!(validate_phone("call me"), Err(ValidationError::InvalidPhone));
        assert_eq!(validate_phone("123456"), Err(ValidationError::InvalidPhone));
    }
}

//! Directed-graph form model.
//!
//! A form is a directed graph of steps addressed by stable id through an
//! id-indexed map, not embedded references, so there is no cyclic ownership.
//! Each step kind is a separate enum variant, making invalid kind/field
//! combinations unrepresentable: only `Choice` steps can branch, everything
//! else has at most one successor.

use crate::types::{ChoiceId, StepId, TemplateId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// One selectable option of a [`Step::Choice`], carrying its own successor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceOption {
    /// Stable option id, matched against submitted answers.
    pub id: ChoiceId,
    /// Operator-facing label.
    pub label: String,
    /// Step to continue with when this option is picked (`None` = terminal end).
    pub next_step_id: Option<StepId>,
}

/// One priced, stock-bounded item of a [`Step::Quantity`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityItem {
    /// Stable choice id, also the inventory counter key.
    pub choice_id: ChoiceId,
    /// Operator-facing label.
    pub label: String,
    /// Unit price in minor currency units.
    pub price: i64,
    /// Seed stock limit copied into the ledger at provisioning (`None` = unbounded).
    pub limit: Option<u32>,
    /// Items excluded from inventory get no ledger counter.
    #[serde(default)]
    pub excluded_from_inventory: bool,
}

/// A single step of the question flow, tagged by kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Step {
    /// Free-form question (text, date, email, ...) with a single successor.
    Linear {
        /// Question shown to the respondent.
        question: String,
        /// Single successor (`None` = terminal end).
        next_step_id: Option<StepId>,
    },
    /// Branch point: one successor per option.
    Choice {
        /// Question shown to the respondent.
        question: String,
        /// Selectable options; each carries its own successor.
        options: Vec<ChoiceOption>,
    },
    /// Priced, stock-bounded item selection with a single successor.
    Quantity {
        /// Question shown to the respondent.
        question: String,
        /// Selectable items.
        items: Vec<QuantityItem>,
        /// Single successor (`None` = terminal end).
        next_step_id: Option<StepId>,
    },
    /// End of the flow; no successor.
    Terminal {
        /// Message shown after submitting.
        thank_you_message: String,
        /// Label for the submit button.
        submit_label: String,
    },
}

impl Step {
    /// Returns every successor this step can reach, one edge per branch.
    pub fn successors(&self) -> impl Iterator<Item = &StepId> {
        let ids: Vec<&StepId> = match self {
            Self::Linear { next_step_id, .. } | Self::Quantity { next_step_id, .. } => {
                next_step_id.iter().collect()
            }
            Self::Choice { options, .. } => {
                options.iter().filter_map(|o| o.next_step_id.as_ref()).collect()
            }
            Self::Terminal { .. } => Vec::new(),
        };
        ids.into_iter()
    }

    /// Returns the question text, if the step has one.
    #[must_use]
    pub fn question(&self) -> Option<&str> {
        match self {
            Self::Linear { question, .. }
            | Self::Choice { question, .. }
            | Self::Quantity { question, .. } => Some(question),
            Self::Terminal { .. } => None,
        }
    }
}

/// Rejection reasons for a graph offered to [`FormGraph::validate`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The root step id is not present in the step mapping.
    #[error("root step '{0}' does not exist")]
    MissingRoot(StepId),

    /// A successor reference points at a step id that does not exist.
    #[error("step '{step_id}' references unknown successor '{successor}'")]
    UnknownSuccessor {
        /// Step carrying the dangling reference.
        step_id: StepId,
        /// The missing successor id.
        successor: StepId,
    },

    /// A choice step with no options cannot be answered.
    #[error("choice step '{0}' has no options")]
    EmptyChoice(StepId),

    /// A quantity step with no items offers nothing to order.
    #[error("quantity step '{0}' has no items")]
    EmptyQuantity(StepId),

    /// Option or item ids must be unique within their step.
    #[error("step '{step_id}' declares duplicate choice id '{choice_id}'")]
    DuplicateChoice {
        /// Step carrying the duplicate.
        step_id: StepId,
        /// The repeated choice id.
        choice_id: ChoiceId,
    },

    /// The successor edges form a cycle through the named step.
    #[error("graph contains a cycle through step '{0}'")]
    Cycle(StepId),
}

/// Directed graph of steps defining the question flow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormGraph {
    /// Entry point of the flow.
    pub root_step_id: StepId,
    /// All steps, addressed by id.
    pub steps: BTreeMap<StepId, Step>,
}

impl FormGraph {
    /// Validates the graph for acceptance into the system.
    ///
    /// Checks that the root exists, every referenced successor exists, choice
    /// and quantity steps are non-empty, choice ids are unique within their
    /// step, and the successor edges are acyclic. Unreachable steps are
    /// permitted: operators park draft branches.
    ///
    /// # Errors
    ///
    /// Returns the first [`GraphError`] found.
    pub fn validate(&self) -> Result<(), GraphError> {
        if !self.steps.contains_key(&self.root_step_id) {
            return Err(GraphError::MissingRoot(self.root_step_id.clone()));
        }

        for (step_id, step) in &self.steps {
            match step {
                Step::Choice { options, .. } => {
                    if options.is_empty() {
                        return Err(GraphError::EmptyChoice(step_id.clone()));
                    }
                    let mut seen = BTreeSet::new();
                    for option in options {
                        if !seen.insert(&option.id) {
                            return Err(GraphError::DuplicateChoice {
                                step_id: step_id.clone(),
                                choice_id: option.id.clone(),
                            });
                        }
                    }
                }
                Step::Quantity { items, .. } => {
                    if items.is_empty() {
                        return Err(GraphError::EmptyQuantity(step_id.clone()));
                    }
                    let mut seen = BTreeSet::new();
                    for item in items {
                        if !seen.insert(&item.choice_id) {
                            return Err(GraphError::DuplicateChoice {
                                step_id: step_id.clone(),
                                choice_id: item.choice_id.clone(),
                            });
                        }
                    }
                }
                Step::Linear { .. } | Step::Terminal { .. } => {}
            }

            for successor in step.successors() {
                if !self.steps.contains_key(successor) {
                    return Err(GraphError::UnknownSuccessor {
                        step_id: step_id.clone(),
                        successor: successor.clone(),
                    });
                }
            }
        }

        self.reject_cycles()
    }

    /// Iterative three-color DFS over the successor edges.
    fn reject_cycles(&self) -> Result<(), GraphError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut colors: BTreeMap<&StepId, Color> =
            self.steps.keys().map(|id| (id, Color::White)).collect();

        for start in self.steps.keys() {
            if colors.get(start) != Some(&Color::White) {
                continue;
            }
            // Stack entries: (step, whether its children were already pushed).
            let mut stack = vec![(start, false)];
            while let Some((step_id, expanded)) = stack.pop() {
                if expanded {
                    colors.insert(step_id, Color::Black);
                    continue;
                }
                colors.insert(step_id, Color::Gray);
                stack.push((step_id, true));
                if let Some(step) = self.steps.get(step_id) {
                    for successor in step.successors() {
                        match colors.get(successor) {
                            Some(Color::Gray) => {
                                return Err(GraphError::Cycle(successor.clone()));
                            }
                            Some(Color::White) => stack.push((successor, false)),
                            _ => {}
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Looks up a step by id.
    #[must_use]
    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps.get(id)
    }
}

/// A named, persisted form graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormTemplate {
    /// Unique template identifier.
    pub id: TemplateId,
    /// Operator-facing name.
    pub name: String,
    /// The question flow.
    pub graph: FormGraph,
    /// When the template was created.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear(next: Option<&str>) -> Step {
        Step::Linear {
            question: "q".to_string(),
            next_step_id: next.map(StepId::new),
        }
    }

    fn graph(root: &str, steps: Vec<(&str, Step)>) -> FormGraph {
        FormGraph {
            root_step_id: StepId::new(root),
            steps: steps.into_iter().map(|(id, s)| (StepId::new(id), s)).collect(),
        }
    }

    #[test]
    fn accepts_linear_chain() {
        let g = graph(
            "a",
            vec![
                ("a", linear(Some("b"))),
                ("b", linear(Some("c"))),
                (
                    "c",
                    Step::Terminal {
                        thank_you_message: "thanks".to_string(),
                        submit_label: "send".to_string(),
                    },
                ),
            ],
        );
        assert_eq!(g.validate(), Ok(()));
    }

    #[test]
    fn rejects_missing_root() {
        let g = graph("missing", vec![("a", linear(None))]);
        assert_eq!(g.validate(), Err(GraphError::MissingRoot(StepId::new("missing"))));
    }

    #[test]
    fn rejects_dangling_successor() {
        let g = graph("a", vec![("a", linear(Some("ghost")))]);
        assert_eq!(
            g.validate(),
            Err(GraphError::UnknownSuccessor {
                step_id: StepId::new("a"),
                successor: StepId::new("ghost"),
            })
        );
    }

    #[test]
    fn rejects_cycle() {
        let g = graph(
            "a",
            vec![("a", linear(Some("b"))), ("b", linear(Some("a")))],
        );
        assert!(matches!(g.validate(), Err(GraphError::Cycle(_))));
    }

    #[test]
    fn rejects_self_loop_through_choice() {
        let g = graph(
            "pick",
            vec![(
                "pick",
                Step::Choice {
                    question: "which".to_string(),
                    options: vec![ChoiceOption {
                        id: ChoiceId::new("again"),
                        label: "Again".to_string(),
                        next_step_id: Some(StepId::new("pick")),
                    }],
                },
            )],
        );
        assert_eq!(g.validate(), Err(GraphError::Cycle(StepId::new("pick"))));
    }

    #[test]
    fn rejects_empty_choice_and_duplicate_ids() {
        let empty = graph(
            "c",
            vec![(
                "c",
                Step::Choice {
                    question: "q".to_string(),
                    options: vec![],
                },
            )],
        );
        assert_eq!(empty.validate(), Err(GraphError::EmptyChoice(StepId::new("c"))));

        let dup = graph(
            "q",
            vec![(
                "q",
                Step::Quantity {
                    question: "q".to_string(),
                    items: vec![
                        QuantityItem {
                            choice_id: ChoiceId::new("x"),
                            label: "X".to_string(),
                            price: 100,
                            limit: None,
                            excluded_from_inventory: false,
                        },
                        QuantityItem {
                            choice_id: ChoiceId::new("x"),
                            label: "X again".to_string(),
                            price: 100,
                            limit: None,
                            excluded_from_inventory: false,
                        },
                    ],
                    next_step_id: None,
                },
            )],
        );
        assert!(matches!(dup.validate(), Err(GraphError::DuplicateChoice { .. })));
    }

    #[test]
    fn permits_unreachable_steps() {
        let g = graph(
            "a",
            vec![("a", linear(None)), ("parked-draft", linear(None))],
        );
        assert_eq!(g.validate(), Ok(()));
    }

    #[test]
    fn step_serializes_with_kind_tag() {
        let step = linear(Some("b"));
        let json = serde_json::to_value(&step).expect("serialize");
        assert_eq!(json["kind"], "linear");
        assert_eq!(json["nextStepId"], "b");
    }
}

//! Branching form model: the step graph and answer-driven traversal.

pub mod graph;
pub mod traversal;

pub use graph::{ChoiceOption, FormGraph, FormTemplate, GraphError, QuantityItem, Step};
pub use traversal::{labelled_answers, walk, AnswerValue, LabelledAnswer, QuantityAnswer};

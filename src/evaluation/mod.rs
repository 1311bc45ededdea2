//! Model evaluation against labeled records

mod evaluator;
mod metrics;

pub use evaluator::Evaluator;
pub use metrics::{ConfusionMatrix, EvaluationReport};

//! Score aggregation and explanations
//!
//! Two aggregation policies are supported:
//! - Weighted blend of the unsupervised scorers ([`AnomalyEnsemble`])
//! - Single-model selection, an identity pass-through of one scorer
//!
//! [`explain`] turns a feature vector and its sub-scores into
//! human-readable reasons.

mod aggregator;
mod blend;
mod explanation;

pub use aggregator::{AggregationPolicy, BlendWeights, RiskTier, ScoreAggregator, SubScores};
pub use blend::AnomalyEnsemble;
pub use explanation::{explain, WEAK_SIGNALS_REASON};

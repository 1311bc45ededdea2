//! Prediction result

use crate::ensemble::{RiskTier, SubScores};
use serde::{Deserialize, Serialize};

/// Outcome of scoring one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub is_fraud: bool,
    /// Final score scaled to `0..=100`
    pub risk_score: u8,
    /// Final score in `[0, 1]`
    pub score: f64,
    /// Distance from the decision threshold, discounted for placeholder sub-scores
    pub confidence: f64,
    pub risk_tier: RiskTier,
    pub sub_scores: SubScores,
    pub explanation: Vec<String>,
}

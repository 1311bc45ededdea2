//! Score aggregation policies

use crate::anomaly::NEUTRAL_SCORE;
use crate::error::{FraudError, Result};
use crate::training::ModelKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Weights of the unsupervised scorers in a blend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendWeights {
    pub isolation_forest: f64,
    pub lof: f64,
    pub one_class: f64,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            isolation_forest: 0.4,
            lof: 0.3,
            one_class: 0.3,
        }
    }
}

impl BlendWeights {
    pub fn new(isolation_forest: f64, lof: f64, one_class: f64) -> Self {
        Self {
            isolation_forest,
            lof,
            one_class,
        }
    }

    pub fn sum(&self) -> f64 {
        self.isolation_forest + self.lof + self.one_class
    }

    /// Weights must be non-negative and sum to 1
    pub fn validate(&self) -> Result<()> {
        for (name, w) in [
            ("blend_weights.isolation_forest", self.isolation_forest),
            ("blend_weights.lof", self.lof),
            ("blend_weights.one_class", self.one_class),
        ] {
            if !(w.is_finite() && w >= 0.0) {
                return Err(FraudError::invalid_parameter(name, w, "must be non-negative"));
            }
        }
        if (self.sum() - 1.0).abs() > 1e-6 {
            return Err(FraudError::invalid_parameter(
                "blend_weights",
                self.sum(),
                "weights must sum to 1",
            ));
        }
        Ok(())
    }

    /// Weight of one scorer; zero for kinds that are not blended
    pub fn weight(&self, kind: ModelKind) -> f64 {
        match kind {
            ModelKind::IsolationForest => self.isolation_forest,
            ModelKind::Lof => self.lof,
            ModelKind::OneClass => self.one_class,
            ModelKind::WeightedForest | ModelKind::Ensemble => 0.0,
        }
    }
}

/// How sub-scores become the final score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// Fixed-weight linear combination of the unsupervised scores
    WeightedBlend(BlendWeights),
    /// Pass through exactly one scorer
    SingleModel(ModelKind),
}

impl Default for AggregationPolicy {
    fn default() -> Self {
        AggregationPolicy::WeightedBlend(BlendWeights::default())
    }
}

/// Per-scorer scores for one point
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub weighted_forest: Option<f64>,
    pub isolation_forest: Option<f64>,
    pub lof: Option<f64>,
    pub one_class: Option<f64>,
    /// Scorers whose value is a placeholder rather than a measurement
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub low_confidence: Vec<ModelKind>,
}

impl SubScores {
    pub fn get(&self, kind: ModelKind) -> Option<f64> {
        match kind {
            ModelKind::WeightedForest => self.weighted_forest,
            ModelKind::IsolationForest => self.isolation_forest,
            ModelKind::Lof => self.lof,
            ModelKind::OneClass => self.one_class,
            ModelKind::Ensemble => None,
        }
    }

    /// Present scores in a fixed order
    pub fn iter(&self) -> impl Iterator<Item = (ModelKind, f64)> + '_ {
        ModelKind::ALL
            .into_iter()
            .filter_map(move |kind| Some((kind, self.get(kind)?)))
    }

    pub fn is_low_confidence(&self, kind: ModelKind) -> bool {
        self.low_confidence.contains(&kind)
    }
}

/// Risk tier of a final score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// High above 0.7, medium above 0.4
    pub fn from_score(score: f64) -> Self {
        if score > 0.7 {
            RiskTier::High
        } else if score > 0.4 {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        };
        f.write_str(name)
    }
}

/// Combines sub-scores under an [`AggregationPolicy`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreAggregator {
    policy: AggregationPolicy,
}

impl ScoreAggregator {
    pub fn new(policy: AggregationPolicy) -> Self {
        Self { policy }
    }

    pub fn blend(weights: BlendWeights) -> Self {
        Self::new(AggregationPolicy::WeightedBlend(weights))
    }

    pub fn single(kind: ModelKind) -> Self {
        Self::new(AggregationPolicy::SingleModel(kind))
    }

    pub fn policy(&self) -> &AggregationPolicy {
        &self.policy
    }

    /// Final score in `[0, 1]`.
    ///
    /// A blend substitutes the neutral score for a missing scorer; single-model
    /// selection fails with `ModelNotTrained` when its scorer is absent.
    pub fn aggregate(&self, scores: &SubScores) -> Result<f64> {
        match &self.policy {
            AggregationPolicy::WeightedBlend(w) => {
                let blended = w.isolation_forest * scores.isolation_forest.unwrap_or(NEUTRAL_SCORE)
                    + w.lof * scores.lof.unwrap_or(NEUTRAL_SCORE)
                    + w.one_class * scores.one_class.unwrap_or(NEUTRAL_SCORE);
                Ok(blended.clamp(0.0, 1.0))
            }
            AggregationPolicy::SingleModel(kind) => scores
                .get(*kind)
                .map(|s| s.clamp(0.0, 1.0))
                .ok_or(FraudError::ModelNotTrained),
        }
    }

    /// Share of the final score backed by real measurements, in `[0, 1]`
    pub fn confidence_weight(&self, scores: &SubScores) -> f64 {
        match &self.policy {
            AggregationPolicy::WeightedBlend(w) => {
                let placeholder: f64 = scores.low_confidence.iter().map(|k| w.weight(*k)).sum();
                (1.0 - placeholder).clamp(0.0, 1.0)
            }
            AggregationPolicy::SingleModel(kind) => {
                if scores.is_low_confidence(*kind) {
                    0.0
                } else {
                    1.0
                }
            }
        }
    }
}

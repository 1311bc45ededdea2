//! Blended unsupervised ensemble

use super::aggregator::{BlendWeights, ScoreAggregator, SubScores};
use crate::anomaly::{AnomalyDetector, IsolationForest, LocalOutlierFactor, OneClassScorer};
use crate::error::{FraudError, Result};
use crate::features::FeatureVector;
use crate::training::progress::{self, ProgressTracker};
use crate::training::ModelKind;
use serde::{Deserialize, Serialize};

/// Isolation forest, LOF and one-class scorer combined by fixed weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEnsemble {
    pub isolation_forest: IsolationForest,
    pub lof: LocalOutlierFactor,
    pub one_class: OneClassScorer,
    aggregator: ScoreAggregator,
    threshold: f64,
}

impl AnomalyEnsemble {
    pub fn new(
        isolation_forest: IsolationForest,
        lof: LocalOutlierFactor,
        one_class: OneClassScorer,
        weights: BlendWeights,
    ) -> Self {
        Self {
            isolation_forest,
            lof,
            one_class,
            aggregator: ScoreAggregator::blend(weights),
            threshold: 0.5,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn aggregator(&self) -> &ScoreAggregator {
        &self.aggregator
    }

    /// Fit all three scorers; one progress unit per isolation tree plus one per
    /// density scorer
    pub fn fit_with_progress(
        &mut self,
        data: &[FeatureVector],
        progress: Option<&ProgressTracker>,
    ) -> Result<()> {
        // Fit copies so that a failure or cancellation leaves self unchanged
        let mut isolation_forest = self.isolation_forest.clone();
        let mut lof = self.lof.clone();
        let mut one_class = self.one_class.clone();

        isolation_forest.fit_with_progress(data, progress)?;

        if progress::cancelled(progress) {
            return Err(FraudError::TrainingCancelled);
        }
        lof.fit(data)?;
        progress::advance(progress);

        if progress::cancelled(progress) {
            return Err(FraudError::TrainingCancelled);
        }
        one_class.fit(data)?;
        progress::advance(progress);

        self.isolation_forest = isolation_forest;
        self.lof = lof;
        self.one_class = one_class;
        Ok(())
    }

    /// Scores of each member
    pub fn sub_scores(&self, point: &FeatureVector) -> SubScores {
        let lof = self.lof.score_point(point);
        SubScores {
            isolation_forest: Some(self.isolation_forest.score(point)),
            lof: Some(lof.value()),
            one_class: Some(self.one_class.score(point)),
            low_confidence: if lof.is_confident() {
                Vec::new()
            } else {
                vec![ModelKind::Lof]
            },
            ..Default::default()
        }
    }
}

impl AnomalyDetector for AnomalyEnsemble {
    fn fit(&mut self, data: &[FeatureVector]) -> Result<()> {
        self.fit_with_progress(data, None)
    }

    fn score(&self, point: &FeatureVector) -> f64 {
        // A blend always has a value for every member
        self.aggregator
            .aggregate(&self.sub_scores(point))
            .unwrap_or(crate::anomaly::NEUTRAL_SCORE)
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}

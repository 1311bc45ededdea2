//! Trained fraud model

use super::prediction::Prediction;
use crate::anomaly::{AnomalyDetector, IsolationForest, LocalOutlierFactor, OneClassScorer};
use crate::ensemble::{explain, AnomalyEnsemble, RiskTier, ScoreAggregator, SubScores};
use crate::error::{FraudError, Result};
use crate::evaluation::EvaluationReport;
use crate::features::{FeatureExtractor, FeatureId, FeatureVector, Transaction};
use crate::training::{ModelKind, WeightedForest};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// The fitted scorer inside a [`FraudModel`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrainedScorer {
    WeightedForest(WeightedForest),
    IsolationForest(IsolationForest),
    Lof(LocalOutlierFactor),
    OneClass(OneClassScorer),
    Ensemble(AnomalyEnsemble),
}

impl TrainedScorer {
    pub fn kind(&self) -> ModelKind {
        match self {
            TrainedScorer::WeightedForest(_) => ModelKind::WeightedForest,
            TrainedScorer::IsolationForest(_) => ModelKind::IsolationForest,
            TrainedScorer::Lof(_) => ModelKind::Lof,
            TrainedScorer::OneClass(_) => ModelKind::OneClass,
            TrainedScorer::Ensemble(_) => ModelKind::Ensemble,
        }
    }

    /// Aggregation applied to this scorer's sub-scores
    pub fn aggregator(&self) -> ScoreAggregator {
        match self {
            TrainedScorer::Ensemble(ensemble) => *ensemble.aggregator(),
            other => ScoreAggregator::single(other.kind()),
        }
    }

    pub fn sub_scores(&self, point: &FeatureVector) -> Result<SubScores> {
        let scores = match self {
            TrainedScorer::WeightedForest(forest) => SubScores {
                weighted_forest: Some(forest.predict_proba(point)?),
                ..Default::default()
            },
            TrainedScorer::IsolationForest(forest) => SubScores {
                isolation_forest: Some(forest.score(point)),
                ..Default::default()
            },
            TrainedScorer::Lof(lof) => {
                let outcome = lof.score_point(point);
                SubScores {
                    lof: Some(outcome.value()),
                    low_confidence: if outcome.is_confident() {
                        Vec::new()
                    } else {
                        vec![ModelKind::Lof]
                    },
                    ..Default::default()
                }
            }
            TrainedScorer::OneClass(scorer) => SubScores {
                one_class: Some(scorer.score(point)),
                ..Default::default()
            },
            TrainedScorer::Ensemble(ensemble) => ensemble.sub_scores(point),
        };
        Ok(scores)
    }

    /// Number of trees across forest members
    pub fn n_trees(&self) -> usize {
        match self {
            TrainedScorer::WeightedForest(forest) => forest.n_trees(),
            TrainedScorer::IsolationForest(forest) => forest.n_trees(),
            TrainedScorer::Ensemble(ensemble) => ensemble.isolation_forest.n_trees(),
            TrainedScorer::Lof(_) | TrainedScorer::OneClass(_) => 0,
        }
    }

    /// Deepest tree across forest members
    pub fn max_depth(&self) -> usize {
        let isolation_depth =
            |forest: &IsolationForest| forest.trees().iter().map(|t| t.depth()).max().unwrap_or(0);
        match self {
            TrainedScorer::WeightedForest(forest) => {
                forest.trees().iter().map(|t| t.depth()).max().unwrap_or(0)
            }
            TrainedScorer::IsolationForest(forest) => isolation_depth(forest),
            TrainedScorer::Ensemble(ensemble) => isolation_depth(&ensemble.isolation_forest),
            TrainedScorer::Lof(_) | TrainedScorer::OneClass(_) => 0,
        }
    }

    /// Features the scorer reads
    pub fn features(&self) -> Vec<FeatureId> {
        let mut features = match self {
            TrainedScorer::WeightedForest(forest) => forest.features().to_vec(),
            TrainedScorer::IsolationForest(forest) => forest.features().to_vec(),
            TrainedScorer::Lof(lof) => lof.features().to_vec(),
            TrainedScorer::OneClass(scorer) => scorer.features().to_vec(),
            TrainedScorer::Ensemble(ensemble) => {
                let mut all = ensemble.isolation_forest.features().to_vec();
                all.extend_from_slice(ensemble.lof.features());
                all.extend_from_slice(ensemble.one_class.features());
                all
            }
        };
        features.sort();
        features.dedup();
        features
    }
}

/// Human-readable summary of a trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub kind: ModelKind,
    pub threshold: f64,
    pub n_trees: usize,
    pub max_depth: usize,
    pub features: Vec<String>,
    /// Weighted forest only, highest first
    pub feature_importances: Vec<(String, f64)>,
    pub training_samples: usize,
    pub training_time_secs: f64,
    pub trained_at: DateTime<Utc>,
    pub metrics: Option<EvaluationReport>,
}

/// A trained, immutable fraud model.
///
/// Carries the amount statistics of its training corpus so that z-scores at
/// predict time match those seen during training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudModel {
    extractor: FeatureExtractor,
    scorer: TrainedScorer,
    threshold: f64,
    metrics: Option<EvaluationReport>,
    training_samples: usize,
    training_time_secs: f64,
    trained_at: DateTime<Utc>,
}

impl FraudModel {
    /// A one-class scorer always classifies at its own decision boundary, so
    /// `threshold` is ignored for [`TrainedScorer::OneClass`].
    pub fn new(extractor: FeatureExtractor, scorer: TrainedScorer, threshold: f64) -> Self {
        let threshold = match &scorer {
            TrainedScorer::OneClass(one_class) => one_class.threshold(),
            _ => threshold,
        };
        Self {
            extractor,
            scorer,
            threshold,
            metrics: None,
            training_samples: 0,
            training_time_secs: 0.0,
            trained_at: Utc::now(),
        }
    }

    pub fn with_metrics(mut self, metrics: Option<EvaluationReport>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_training_info(mut self, samples: usize, secs: f64) -> Self {
        self.training_samples = samples;
        self.training_time_secs = secs;
        self
    }

    pub fn kind(&self) -> ModelKind {
        self.scorer.kind()
    }

    pub fn scorer(&self) -> &TrainedScorer {
        &self.scorer
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn metrics(&self) -> Option<&EvaluationReport> {
        self.metrics.as_ref()
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    /// Feature vector of a record under this model's statistics
    pub fn features(&self, tx: &Transaction) -> Result<FeatureVector> {
        if tx.has_amount_field() && tx.amount().is_none() {
            return Err(FraudError::InvalidInput(
                "amount field is not a finite number".to_string(),
            ));
        }
        Ok(self.extractor.extract(tx))
    }

    /// Final score in `[0, 1]`
    pub fn score(&self, tx: &Transaction) -> Result<f64> {
        let features = self.features(tx)?;
        let scores = self.scorer.sub_scores(&features)?;
        self.scorer.aggregator().aggregate(&scores)
    }

    pub fn predict(&self, tx: &Transaction) -> Result<Prediction> {
        let features = self.features(tx)?;
        self.predict_vector(&features)
    }

    /// Predict from an already extracted feature vector
    pub fn predict_vector(&self, features: &FeatureVector) -> Result<Prediction> {
        let scores = self.scorer.sub_scores(features)?;
        let aggregator = self.scorer.aggregator();
        let score = aggregator.aggregate(&scores)?;

        let is_fraud = match &self.scorer {
            // Anomalous iff the decision value falls below rho
            TrainedScorer::OneClass(one_class) => one_class.is_anomaly(features),
            _ => score > self.threshold,
        };
        let span = if is_fraud {
            1.0 - self.threshold
        } else {
            self.threshold
        };
        let margin = if span > 0.0 {
            ((score - self.threshold).abs() / span).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let confidence = margin * aggregator.confidence_weight(&scores);

        Ok(Prediction {
            is_fraud,
            risk_score: (score * 100.0).round().clamp(0.0, 100.0) as u8,
            score,
            confidence,
            risk_tier: RiskTier::from_score(score),
            explanation: explain(features, &scores, is_fraud),
            sub_scores: scores,
        })
    }

    /// Predict a batch in parallel, preserving order
    pub fn predict_batch(&self, txs: &[Transaction]) -> Result<Vec<Prediction>> {
        txs.par_iter().map(|tx| self.predict(tx)).collect()
    }

    pub fn summary(&self) -> ModelSummary {
        let feature_importances = match &self.scorer {
            TrainedScorer::WeightedForest(forest) => forest
                .feature_importances()
                .into_iter()
                .map(|(id, imp)| (id.to_string(), imp))
                .collect(),
            _ => Vec::new(),
        };
        ModelSummary {
            kind: self.kind(),
            threshold: self.threshold,
            n_trees: self.scorer.n_trees(),
            max_depth: self.scorer.max_depth(),
            features: self.scorer.features().iter().map(|f| f.to_string()).collect(),
            feature_importances,
            training_samples: self.training_samples,
            training_time_secs: self.training_time_secs,
            trained_at: self.trained_at,
            metrics: self.metrics.clone(),
        }
    }
}

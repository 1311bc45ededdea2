//! Training engine
//!
//! Runs one training round: validate, split, refresh amount statistics,
//! extract features, fit the configured scorer and evaluate it on the
//! held-out records.

use super::config::{ModelKind, TrainingConfig};
use super::dataset::{train_test_split, validate_dataset};
use super::progress::{ProgressTracker, TrainingStage};
use super::random_forest::WeightedForest;
use crate::anomaly::{AnomalyDetector, IsolationForest, LocalOutlierFactor, OneClassScorer, NEUTRAL_SCORE};
use crate::ensemble::AnomalyEnsemble;
use crate::error::{FraudError, Result};
use crate::evaluation::{EvaluationReport, Evaluator};
use crate::features::{FeatureExtractor, FeatureVector, Transaction};
use crate::inference::{FraudModel, TrainedScorer};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Result of a training round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingOutcome {
    pub model: FraudModel,
    /// Held-out metrics; `None` when the test split is empty or unlabeled
    pub metrics: Option<EvaluationReport>,
    pub train_size: usize,
    pub test_size: usize,
}

/// Main training engine
#[derive(Debug, Clone, Default)]
pub struct TrainEngine {
    config: TrainingConfig,
}

impl TrainEngine {
    /// Create a new training engine
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train a new model on `dataset`
    pub fn train(&self, dataset: &[Transaction]) -> Result<TrainingOutcome> {
        self.train_with_progress(dataset, None)
    }

    /// Train a new model, reporting stage and percent to `progress`.
    ///
    /// Cancellation is honoured between stages and between trees.
    pub fn train_with_progress(
        &self,
        dataset: &[Transaction],
        progress: Option<&ProgressTracker>,
    ) -> Result<TrainingOutcome> {
        let start = Instant::now();
        let config = &self.config;
        let kind = config.model_kind;

        stage(progress, TrainingStage::Preparing, 1)?;
        config.validate()?;
        let labels = validate_dataset(dataset, kind.is_supervised())?;

        let seed = config.seed.unwrap_or_else(rand::random::<u64>);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let (train_idx, test_idx) = train_test_split(dataset.len(), config.test_split, &mut rng);
        let model_seed: u64 = rng.gen();

        tracing::info!(
            kind = %kind,
            records = dataset.len(),
            train = train_idx.len(),
            test = test_idx.len(),
            seed,
            "Training started"
        );
        advance(progress);

        stage(progress, TrainingStage::ExtractingFeatures, 1)?;
        let train_records: Vec<Transaction> = train_idx.iter().map(|&i| dataset[i].clone()).collect();
        let mut extractor = FeatureExtractor::new();
        extractor.update_statistics(&train_records);
        let train_vectors: Vec<FeatureVector> = train_records
            .par_iter()
            .map(|tx| extractor.extract(tx))
            .collect();
        advance(progress);

        let units = match kind {
            ModelKind::WeightedForest | ModelKind::IsolationForest => config.num_trees(),
            ModelKind::Lof | ModelKind::OneClass => 1,
            ModelKind::Ensemble => config.num_trees() + 2,
        };
        stage(progress, TrainingStage::TrainingModel, units)?;
        let scorer = self.fit_scorer(&train_vectors, &train_idx, &labels, model_seed, progress)?;

        let threshold = config.threshold();
        if kind == ModelKind::OneClass && (threshold - NEUTRAL_SCORE).abs() > f64::EPSILON {
            tracing::warn!(threshold, "One-class models classify at their decision boundary; threshold ignored");
        }
        let model = FraudModel::new(extractor, scorer, threshold);

        stage(progress, TrainingStage::Evaluating, 1)?;
        let test_records: Vec<Transaction> = test_idx.iter().map(|&i| dataset[i].clone()).collect();
        let labeled = !test_records.is_empty() && test_idx.iter().all(|&i| labels[i].is_some());
        let metrics = if labeled {
            Some(Evaluator::new().evaluate(&model, &test_records)?)
        } else {
            tracing::debug!(test = test_records.len(), "Skipping evaluation: no labeled test records");
            None
        };
        advance(progress);

        let elapsed = start.elapsed().as_secs_f64();
        let model = model
            .with_metrics(metrics.clone())
            .with_training_info(train_idx.len(), elapsed);

        if let Some(p) = progress {
            p.set_stage(TrainingStage::Completed, 0);
        }
        tracing::info!(kind = %kind, secs = elapsed, "Training completed");

        Ok(TrainingOutcome {
            model,
            metrics,
            train_size: train_idx.len(),
            test_size: test_idx.len(),
        })
    }

    fn fit_scorer(
        &self,
        vectors: &[FeatureVector],
        train_idx: &[usize],
        labels: &[Option<bool>],
        seed: u64,
        progress: Option<&ProgressTracker>,
    ) -> Result<TrainedScorer> {
        let config = &self.config;
        let scorer = match config.model_kind {
            ModelKind::WeightedForest => {
                let y: Vec<bool> = train_idx
                    .iter()
                    .map(|&i| labels[i].unwrap_or(false))
                    .collect();
                let mut forest = WeightedForest::new(config.num_trees())
                    .with_max_depth(config.max_depth)
                    .with_class_weight(config.class_weight)
                    .with_min_leaf_size(config.min_leaf_size)
                    .with_max_bootstrap_size(config.max_bootstrap_size)
                    .with_fraud_fraction(config.fraud_fraction)
                    .with_threshold(config.threshold())
                    .with_seed(seed);
                forest.fraud_oversample_factor = config.fraud_oversample_factor;
                forest.fit_with_progress(vectors, &y, progress)?;
                TrainedScorer::WeightedForest(forest)
            }
            ModelKind::IsolationForest => {
                let mut forest = self.isolation_forest(seed);
                forest.fit_with_progress(vectors, progress)?;
                TrainedScorer::IsolationForest(forest)
            }
            ModelKind::Lof => {
                let mut lof = self.lof();
                lof.fit(vectors)?;
                advance(progress);
                TrainedScorer::Lof(lof)
            }
            ModelKind::OneClass => {
                let mut scorer = self.one_class();
                scorer.fit(vectors)?;
                advance(progress);
                TrainedScorer::OneClass(scorer)
            }
            ModelKind::Ensemble => {
                let mut ensemble = AnomalyEnsemble::new(
                    self.isolation_forest(seed),
                    self.lof(),
                    self.one_class(),
                    config.blend_weights,
                )
                .with_threshold(config.threshold());
                ensemble.fit_with_progress(vectors, progress)?;
                TrainedScorer::Ensemble(ensemble)
            }
        };
        Ok(scorer)
    }

    fn isolation_forest(&self, seed: u64) -> IsolationForest {
        let mut forest = IsolationForest::new()
            .with_n_estimators(self.config.num_trees())
            .with_max_samples(self.config.subsample_size)
            .with_threshold(self.config.threshold())
            .with_seed(seed);
        if let Some(depth) = self.config.isolation_max_depth {
            forest = forest.with_max_depth(depth);
        }
        forest
    }

    fn lof(&self) -> LocalOutlierFactor {
        LocalOutlierFactor::new(self.config.lof_neighbors).with_threshold(self.config.threshold())
    }

    fn one_class(&self) -> OneClassScorer {
        OneClassScorer::new()
            .with_nu(self.config.nu)
            .with_gamma(self.config.gamma)
            .with_max_support(self.config.max_support)
    }
}

fn stage(progress: Option<&ProgressTracker>, stage: TrainingStage, units: usize) -> Result<()> {
    if let Some(p) = progress {
        if p.is_cancelled() {
            return Err(FraudError::TrainingCancelled);
        }
        p.set_stage(stage, units);
    }
    Ok(())
}

fn advance(progress: Option<&ProgressTracker>) {
    super::progress::advance(progress);
}

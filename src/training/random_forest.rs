//! Weighted decision forest
//!
//! Supervised fraud classifier: an ensemble of class-weighted trees, each
//! grown on a bootstrap sample in which fraud records are oversampled.

use super::decision_tree::DecisionTree;
use super::progress::{self, ProgressTracker};
use crate::error::{FraudError, Result};
use crate::features::{common_features, feature_matrix, FeatureId, FeatureVector};
use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Class-weighted random forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedForest {
    /// Individual trees
    trees: Vec<DecisionTree>,
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: usize,
    /// Multiplier on fraud mass in the split impurity
    pub class_weight: f64,
    /// Minimum samples on each side of a split
    pub min_leaf_size: usize,
    /// Upper bound on each bootstrap sample
    pub max_bootstrap_size: usize,
    /// Target share of fraud records in a bootstrap sample
    pub fraud_fraction: f64,
    /// Fraud records may be repeated at most this many times per sample
    pub fraud_oversample_factor: usize,
    /// Probability above which a point is classified as fraud
    pub threshold: f64,
    /// Random seed
    pub seed: Option<u64>,
    features: Vec<FeatureId>,
    feature_importances: Vec<f64>,
}

impl Default for WeightedForest {
    fn default() -> Self {
        Self::new(50)
    }
}

impl WeightedForest {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: 10,
            class_weight: 10.0,
            min_leaf_size: 2,
            max_bootstrap_size: 5000,
            fraud_fraction: 0.3,
            fraud_oversample_factor: 3,
            threshold: 0.5,
            seed: None,
            features: Vec::new(),
            feature_importances: Vec::new(),
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_class_weight(mut self, weight: f64) -> Self {
        self.class_weight = weight;
        self
    }

    pub fn with_min_leaf_size(mut self, min_leaf: usize) -> Self {
        self.min_leaf_size = min_leaf.max(1);
        self
    }

    pub fn with_max_bootstrap_size(mut self, size: usize) -> Self {
        self.max_bootstrap_size = size.max(1);
        self
    }

    pub fn with_fraud_fraction(mut self, fraction: f64) -> Self {
        self.fraud_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Fit the forest
    pub fn fit(&mut self, data: &[FeatureVector], labels: &[bool]) -> Result<()> {
        self.fit_with_progress(data, labels, None)
    }

    /// Fit the forest, reporting one progress unit per tree.
    ///
    /// Cancellation is checked before each tree; a cancelled fit leaves the
    /// forest unchanged.
    pub fn fit_with_progress(
        &mut self,
        data: &[FeatureVector],
        labels: &[bool],
        progress: Option<&ProgressTracker>,
    ) -> Result<()> {
        if data.is_empty() {
            return Err(FraudError::InvalidInput(
                "cannot fit weighted forest on an empty dataset".to_string(),
            ));
        }
        if data.len() != labels.len() {
            return Err(FraudError::InvalidInput(format!(
                "{} records but {} labels",
                data.len(),
                labels.len()
            )));
        }
        if self.n_estimators == 0 {
            return Err(FraudError::invalid_parameter(
                "n_estimators",
                self.n_estimators,
                "must be at least 1",
            ));
        }

        let features = common_features(data);
        if features.is_empty() {
            return Err(FraudError::InvalidInput(
                "no numeric feature is present in every training record".to_string(),
            ));
        }
        let x = feature_matrix(data, &features);

        let (fraud, legit): (Vec<usize>, Vec<usize>) = (0..labels.len()).partition(|&i| labels[i]);
        let base_seed = self.seed.unwrap_or_else(rand::random::<u64>);

        tracing::info!(
            records = data.len(),
            fraud = fraud.len(),
            legit = legit.len(),
            trees = self.n_estimators,
            "Training weighted forest"
        );

        let trees: Option<Vec<DecisionTree>> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                if progress::cancelled(progress) {
                    return None;
                }
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));

                let sample = self.bootstrap_sample(&fraud, &legit, &mut rng);
                let x_sample = Array2::from_shape_fn((sample.len(), features.len()), |(i, j)| {
                    x[[sample[i], j]]
                });
                let y_sample: Vec<bool> = sample.iter().map(|&i| labels[i]).collect();

                let mut tree = DecisionTree::new()
                    .with_max_depth(self.max_depth)
                    .with_min_leaf_size(self.min_leaf_size)
                    .with_class_weight(self.class_weight);
                // Rows and columns agree by construction
                tree.fit(&x_sample, &y_sample, &features, &mut rng).ok()?;

                progress::advance(progress);
                Some(tree)
            })
            .collect();

        let trees = match trees {
            Some(trees) => trees,
            None if progress::cancelled(progress) => return Err(FraudError::TrainingCancelled),
            None => {
                return Err(FraudError::InvalidInput(
                    "failed to grow a tree from the bootstrap sample".to_string(),
                ))
            }
        };

        let mut importances = vec![0.0; features.len()];
        for tree in &trees {
            for (total, imp) in importances.iter_mut().zip(tree.feature_importances()) {
                *total += imp;
            }
        }
        let sum: f64 = importances.iter().sum();
        if sum > 0.0 {
            for imp in &mut importances {
                *imp /= sum;
            }
        }

        tracing::info!(
            trees = trees.len(),
            max_depth = trees.iter().map(DecisionTree::depth).max().unwrap_or(0),
            features = features.len(),
            "Weighted forest trained"
        );

        self.trees = trees;
        self.features = features;
        self.feature_importances = importances;
        Ok(())
    }

    /// Row indices of one oversampled bootstrap sample
    fn bootstrap_sample<R: Rng>(&self, fraud: &[usize], legit: &[usize], rng: &mut R) -> Vec<usize> {
        let total = fraud.len() + legit.len();
        let sample_size = total.min(self.max_bootstrap_size);

        let (fraud_count, legit_count) = if legit.is_empty() {
            (sample_size, 0)
        } else if fraud.is_empty() {
            (0, sample_size)
        } else {
            let target = (self.fraud_fraction * sample_size as f64).round() as usize;
            let fraud_count = target.min(fraud.len() * self.fraud_oversample_factor);
            (fraud_count, sample_size - fraud_count)
        };

        let mut sample: Vec<usize> = Vec::with_capacity(sample_size);
        sample.extend((0..fraud_count).map(|_| fraud[rng.gen_range(0..fraud.len())]));
        sample.extend((0..legit_count).map(|_| legit[rng.gen_range(0..legit.len())]));
        sample.shuffle(rng);
        sample
    }

    /// Mean leaf fraud probability across trees
    pub fn predict_proba(&self, point: &FeatureVector) -> Result<f64> {
        if self.trees.is_empty() {
            return Err(FraudError::ModelNotTrained);
        }
        let mut sum = 0.0;
        for tree in &self.trees {
            sum += tree.predict_proba(point)?;
        }
        Ok(sum / self.trees.len() as f64)
    }

    /// Whether the mean probability exceeds the threshold
    pub fn predict(&self, point: &FeatureVector) -> Result<bool> {
        Ok(self.predict_proba(point)? > self.threshold)
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn features(&self) -> &[FeatureId] {
        &self.features
    }

    /// Normalized importance per feature, highest first
    pub fn feature_importances(&self) -> Vec<(FeatureId, f64)> {
        let mut ranked: Vec<(FeatureId, f64)> = self
            .features
            .iter()
            .copied()
            .zip(self.feature_importances.iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}

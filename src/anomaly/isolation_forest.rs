//! Isolation Forest anomaly detection

use crate::anomaly::{AnomalyDetector, NEUTRAL_SCORE};
use crate::error::{FraudError, Result};
use crate::features::{common_features, feature_matrix, FeatureId, FeatureVector};
use crate::training::progress::{self, ProgressTracker};
use ndarray::Array2;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Euler-Mascheroni constant
pub const EULER_GAMMA: f64 = 0.577_215_664_9;

/// Average path length of an unsuccessful BST search over `n` points.
///
/// `c(n) = 2 (ln(n - 1) + gamma) - 2 (n - 1) / n` for `n > 1`, else 0.
pub fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n_f = n as f64;
    2.0 * ((n_f - 1.0).ln() + EULER_GAMMA) - 2.0 * (n_f - 1.0) / n_f
}

/// Isolation Tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IsolationTree {
    /// Internal node with split
    Internal {
        /// Feature used for the split
        feature: FeatureId,
        /// Split value (left: value < split_value)
        split_value: f64,
        /// Number of samples that reached this node
        size: usize,
        left: Box<IsolationTree>,
        right: Box<IsolationTree>,
    },
    /// External (leaf) node
    External {
        /// Number of samples in this node
        size: usize,
    },
}

impl IsolationTree {
    /// Build an isolation tree over the rows `indices` of `x`.
    ///
    /// Column `j` of `x` holds feature `features[j]`.
    pub fn build(
        x: &Array2<f64>,
        features: &[FeatureId],
        indices: &[usize],
        height: usize,
        max_height: usize,
        rng: &mut impl Rng,
    ) -> Self {
        let n_samples = indices.len();

        if height >= max_height || n_samples <= 1 || features.is_empty() {
            return IsolationTree::External { size: n_samples };
        }

        let column = rng.gen_range(0..features.len());

        let (min_val, max_val) = indices.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), &i| (lo.min(x[[i, column]]), hi.max(x[[i, column]])),
        );

        // Constant feature on this partition: leaf, no retry on another feature
        if min_val >= max_val {
            return IsolationTree::External { size: n_samples };
        }

        let split_value = rng.gen_range(min_val..max_val);

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, column]] < split_value);

        if left_indices.is_empty() || right_indices.is_empty() {
            return IsolationTree::External { size: n_samples };
        }

        let left = Box::new(Self::build(x, features, &left_indices, height + 1, max_height, rng));
        let right = Box::new(Self::build(x, features, &right_indices, height + 1, max_height, rng));

        IsolationTree::Internal {
            feature: features[column],
            split_value,
            size: n_samples,
            left,
            right,
        }
    }

    /// Number of training samples under this node
    pub fn size(&self) -> usize {
        match self {
            IsolationTree::Internal { size, .. } | IsolationTree::External { size } => *size,
        }
    }

    /// Path length of a point, including the `c(size)` correction at the
    /// node where descent stops.
    ///
    /// A point that does not know the split feature stops at that node.
    pub fn path_length(&self, point: &FeatureVector, current_height: usize) -> f64 {
        match self {
            IsolationTree::External { size } => {
                current_height as f64 + average_path_length(*size)
            }
            IsolationTree::Internal {
                feature,
                split_value,
                size,
                left,
                right,
            } => match point.get(*feature) {
                Some(value) if value < *split_value => left.path_length(point, current_height + 1),
                Some(_) => right.path_length(point, current_height + 1),
                None => current_height as f64 + average_path_length(*size),
            },
        }
    }

    /// Depth of the tree (a single leaf has depth 0)
    pub fn depth(&self) -> usize {
        match self {
            IsolationTree::External { .. } => 0,
            IsolationTree::Internal { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// Isolation Forest anomaly detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    /// Number of trees
    n_estimators: usize,
    /// Maximum samples per tree
    max_samples: usize,
    /// Depth cap; `None` means `ceil(log2(subsample size))`
    max_depth: Option<usize>,
    /// Score above which a point is anomalous
    threshold: f64,
    /// Features to split on; `None` means every feature known in all training rows
    requested_features: Option<Vec<FeatureId>>,
    /// Random seed
    seed: Option<u64>,
    /// Fitted trees
    trees: Vec<IsolationTree>,
    /// Features the fitted trees split on
    features: Vec<FeatureId>,
    /// Subsample size used for fitting
    subsample_size: usize,
}

impl IsolationForest {
    /// Create new Isolation Forest
    pub fn new() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            max_depth: None,
            threshold: 0.6,
            requested_features: None,
            seed: None,
            trees: Vec::new(),
            features: Vec::new(),
            subsample_size: 0,
        }
    }

    /// Set number of trees
    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n.max(1);
        self
    }

    /// Set maximum samples per tree
    pub fn with_max_samples(mut self, n: usize) -> Self {
        self.max_samples = n.max(1);
        self
    }

    /// Use a fixed depth cap instead of `ceil(log2(subsample size))`
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set decision threshold on the anomaly score
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Restrict the features trees may split on
    pub fn with_features(mut self, features: Vec<FeatureId>) -> Self {
        self.requested_features = Some(features);
        self
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Fit, reporting one progress unit per tree and stopping between trees
    /// if cancellation is requested.
    pub fn fit_with_progress(
        &mut self,
        data: &[FeatureVector],
        progress: Option<&ProgressTracker>,
    ) -> Result<()> {
        if data.is_empty() {
            return Err(FraudError::InvalidInput(
                "cannot fit isolation forest on an empty dataset".to_string(),
            ));
        }

        let features = match &self.requested_features {
            Some(requested) => crate::features::select_features(data, requested)?,
            None => common_features(data),
        };
        if features.is_empty() {
            return Err(FraudError::InvalidInput(
                "no numeric feature is present in every training record".to_string(),
            ));
        }

        let n_samples = data.len();
        let subsample_size = self.max_samples.min(n_samples);
        let max_height = self
            .max_depth
            .unwrap_or_else(|| (subsample_size as f64).log2().ceil() as usize);

        let x = feature_matrix(data, &features);
        let base_seed = self.seed.unwrap_or_else(rand::random::<u64>);

        let trees: Option<Vec<IsolationTree>> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                if progress::cancelled(progress) {
                    return None;
                }
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));

                // Unweighted subsample without replacement
                let indices = index::sample(&mut rng, n_samples, subsample_size).into_vec();

                let tree = IsolationTree::build(&x, &features, &indices, 0, max_height, &mut rng);
                progress::advance(progress);
                Some(tree)
            })
            .collect();

        let trees = trees.ok_or(FraudError::TrainingCancelled)?;

        tracing::info!(
            trees = trees.len(),
            subsample_size,
            max_height,
            features = features.len(),
            "Isolation forest trained"
        );

        self.trees = trees;
        self.features = features;
        self.subsample_size = subsample_size;
        Ok(())
    }

    /// Average path length of a point across all trees
    pub fn average_path(&self, point: &FeatureVector) -> Option<f64> {
        if self.trees.is_empty() {
            return None;
        }
        let total: f64 = self.trees.iter().map(|t| t.path_length(point, 0)).sum();
        Some(total / self.trees.len() as f64)
    }

    /// Fitted trees
    pub fn trees(&self) -> &[IsolationTree] {
        &self.trees
    }

    /// Number of fitted trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Features the fitted trees split on
    pub fn features(&self) -> &[FeatureId] {
        &self.features
    }

    /// Subsample size used during fitting
    pub fn subsample_size(&self) -> usize {
        self.subsample_size
    }

    /// Configured number of trees
    pub fn n_estimators(&self) -> usize {
        self.n_estimators
    }
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self::new()
    }
}

impl AnomalyDetector for IsolationForest {
    fn fit(&mut self, data: &[FeatureVector]) -> Result<()> {
        self.fit_with_progress(data, None)
    }

    /// `s(x) = 2^(-E[h(x)] / c(subsample size))`, clamped to `[0, 1]`.
    ///
    /// An unfitted forest scores every point as neutral.
    fn score(&self, point: &FeatureVector) -> f64 {
        let c_n = average_path_length(self.subsample_size);
        match self.average_path(point) {
            Some(avg) if c_n > 0.0 => {
                let score = 2.0_f64.powf(-avg / c_n);
                if score.is_finite() {
                    score.clamp(0.0, 1.0)
                } else {
                    NEUTRAL_SCORE
                }
            }
            _ => NEUTRAL_SCORE,
        }
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_with_outlier() -> Vec<FeatureVector> {
        let mut data: Vec<FeatureVector> = (0..99)
            .map(|i| {
                FeatureVector::from_pairs([
                    (FeatureId::Amount, 45.0 + (i % 10) as f64),
                    (FeatureId::Hour, (i % 24) as f64),
                ])
            })
            .collect();
        // 100x the cluster mean
        data.push(FeatureVector::from_pairs([
            (FeatureId::Amount, 5000.0),
            (FeatureId::Hour, 12.0),
        ]));
        data
    }

    #[test]
    fn test_average_path_length_values() {
        assert_eq!(average_path_length(0), 0.0);
        assert_eq!(average_path_length(1), 0.0);
        assert!((average_path_length(2) - (2.0 * EULER_GAMMA - 1.0)).abs() < 1e-12);

        let mut prev = average_path_length(2);
        for n in 3..2000 {
            let c = average_path_length(n);
            assert!(c >= prev, "c({}) = {} < c({}) = {}", n, c, n - 1, prev);
            prev = c;
        }
    }

    #[test]
    fn test_outlier_has_shorter_path() {
        let data = cluster_with_outlier();
        let mut forest = IsolationForest::new()
            .with_n_estimators(100)
            .with_seed(7);
        forest.fit(&data).unwrap();

        let outlier = &data[99];
        let inlier = &data[42];

        assert!(forest.average_path(outlier).unwrap() < forest.average_path(inlier).unwrap());
        assert!(forest.score(outlier) > forest.score(inlier));
    }

    #[test]
    fn test_detect_flags_match_scores() {
        let data = cluster_with_outlier();
        let mut forest = IsolationForest::new()
            .with_n_estimators(100)
            .with_threshold(0.65)
            .with_seed(3);
        forest.fit(&data).unwrap();

        let result = forest.detect(&data);
        assert_eq!(result.scores.len(), data.len());
        assert_eq!(result.threshold, 0.65);
        assert!(result.flags[99]);
        assert_eq!(result.n_anomalies, result.flags.iter().filter(|f| **f).count());
        for (i, p) in data.iter().enumerate() {
            assert_eq!(result.flags[i], result.scores[i] > 0.65);
            assert_eq!(result.scores[i], forest.score(p));
        }
    }

    #[test]
    fn test_scores_in_unit_interval_with_missing_features() {
        let data = cluster_with_outlier();
        let mut forest = IsolationForest::new().with_n_estimators(30).with_seed(1);
        forest.fit(&data).unwrap();

        let probes = [
            FeatureVector::new(),
            FeatureVector::from_pairs([(FeatureId::Amount, 1e9)]),
            FeatureVector::from_pairs([(FeatureId::Hour, -3.0)]),
            FeatureVector::from_pairs([(FeatureId::Velocity, 2.0)]),
            data[0].clone(),
        ];
        for p in &probes {
            let s = forest.score(p);
            assert!((0.0..=1.0).contains(&s), "score {} out of range", s);
        }
    }

    #[test]
    fn test_unfitted_forest_is_neutral() {
        let forest = IsolationForest::new();
        let point = FeatureVector::from_pairs([(FeatureId::Amount, 10.0)]);
        assert_eq!(forest.score(&point), NEUTRAL_SCORE);
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let mut forest = IsolationForest::new();
        assert!(matches!(forest.fit(&[]), Err(FraudError::InvalidInput(_))));
    }

    #[test]
    fn test_forest_shape_and_depth_cap() {
        let data = cluster_with_outlier();
        let mut forest = IsolationForest::new()
            .with_n_estimators(12)
            .with_max_samples(32)
            .with_seed(3);
        forest.fit(&data).unwrap();

        assert_eq!(forest.n_trees(), 12);
        // ceil(log2(32)) = 5
        assert!(forest.trees().iter().all(|t| t.depth() <= 5));
        assert!(forest.trees().iter().all(|t| t.size() == 32));

        let capped = {
            let mut f = IsolationForest::new().with_n_estimators(5).with_max_depth(2).with_seed(3);
            f.fit(&data).unwrap();
            f
        };
        assert!(capped.trees().iter().all(|t| t.depth() <= 2));
    }

    #[test]
    fn test_constant_feature_yields_leaf() {
        let data: Vec<FeatureVector> = (0..20)
            .map(|_| FeatureVector::from_pairs([(FeatureId::Amount, 10.0)]))
            .collect();
        let mut forest = IsolationForest::new().with_n_estimators(5).with_seed(11);
        forest.fit(&data).unwrap();
        assert!(forest
            .trees()
            .iter()
            .all(|t| matches!(t, IsolationTree::External { size: 20 })));
    }

    #[test]
    fn test_missing_split_feature_stops_descent() {
        let tree = IsolationTree::Internal {
            feature: FeatureId::Amount,
            split_value: 10.0,
            size: 8,
            left: Box::new(IsolationTree::External { size: 4 }),
            right: Box::new(IsolationTree::External { size: 4 }),
        };
        let unknown = FeatureVector::new();
        assert_eq!(tree.path_length(&unknown, 0), average_path_length(8));

        let known = FeatureVector::from_pairs([(FeatureId::Amount, 3.0)]);
        assert_eq!(tree.path_length(&known, 0), 1.0 + average_path_length(4));
    }

    #[test]
    fn test_same_seed_same_forest() {
        let data = cluster_with_outlier();
        let mut a = IsolationForest::new().with_n_estimators(10).with_seed(99);
        let mut b = IsolationForest::new().with_n_estimators(10).with_seed(99);
        a.fit(&data).unwrap();
        b.fit(&data).unwrap();
        assert_eq!(a.trees(), b.trees());
    }

    #[test]
    fn test_cancelled_fit_leaves_model_untouched() {
        let data = cluster_with_outlier();
        let tracker = ProgressTracker::new();
        tracker.cancel();
        let mut forest = IsolationForest::new().with_n_estimators(10).with_seed(5);
        let result = forest.fit_with_progress(&data, Some(&tracker));
        assert!(matches!(result, Err(FraudError::TrainingCancelled)));
        assert_eq!(forest.n_trees(), 0);
    }
}

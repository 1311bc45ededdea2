//! Class-weighted decision tree
//!
//! Binary classification tree whose splits minimise a Gini impurity in which
//! fraud samples count `class_weight` times. Leaves store the (unweighted)
//! fraud fraction of the samples that reached them.

use crate::error::{FraudError, Result};
use crate::features::{FeatureId, FeatureVector};
use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Contribution of a tree that cannot route a point
pub const NEUTRAL_PROBABILITY: f64 = 0.5;

/// Maximum number of split points evaluated per candidate feature
const MAX_SPLIT_POINTS: usize = 10;

/// Decision tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with the fraud fraction of its samples
    Leaf {
        fraud_probability: f64,
        n_samples: usize,
    },
    /// Internal node; `value <= threshold` goes left
    Split {
        feature: FeatureId,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

impl TreeNode {
    fn predict(&self, point: &FeatureVector) -> f64 {
        match self {
            TreeNode::Leaf {
                fraud_probability, ..
            } => *fraud_probability,
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
                ..
            } => match point.get(*feature) {
                Some(v) if v <= *threshold => left.predict(point),
                Some(_) => right.predict(point),
                None => NEUTRAL_PROBABILITY,
            },
        }
    }

    /// Depth of the subtree rooted here (a leaf has depth 0)
    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    pub fn n_leaves(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }

    pub fn n_samples(&self) -> usize {
        match self {
            TreeNode::Leaf { n_samples, .. } | TreeNode::Split { n_samples, .. } => *n_samples,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, TreeNode::Leaf { .. })
    }
}

/// Gini impurity with fraud mass scaled by `class_weight`.
///
/// With `class_weight == 1` this is the standard Gini impurity.
pub fn weighted_gini(fraud: usize, legit: usize, class_weight: f64) -> f64 {
    let fraud_mass = fraud as f64 * class_weight;
    let legit_mass = legit as f64;
    let total = fraud_mass + legit_mass;
    if total <= 0.0 {
        return 0.0;
    }
    let pf = fraud_mass / total;
    let pl = legit_mass / total;
    1.0 - pf * pf - pl * pl
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    column: usize,
    threshold: f64,
    impurity: f64,
}

/// Class-weighted decision tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: usize,
    /// Minimum samples on each side of a split
    pub min_leaf_size: usize,
    /// Multiplier on fraud mass in the impurity
    pub class_weight: f64,
    /// Features the tree was trained over, in matrix column order
    features: Vec<FeatureId>,
    /// Impurity decrease per feature, normalized to sum to 1
    feature_importances: Vec<f64>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTree {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: 10,
            min_leaf_size: 2,
            class_weight: 10.0,
            features: Vec::new(),
            feature_importances: Vec::new(),
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_leaf_size(mut self, min_leaf: usize) -> Self {
        self.min_leaf_size = min_leaf.max(1);
        self
    }

    /// Set fraud class weight
    pub fn with_class_weight(mut self, weight: f64) -> Self {
        self.class_weight = weight;
        self
    }

    /// Fit on a dense matrix whose columns are `features`
    pub fn fit<R: Rng>(
        &mut self,
        x: &Array2<f64>,
        y: &[bool],
        features: &[FeatureId],
        rng: &mut R,
    ) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(FraudError::InvalidInput(format!(
                "{} rows but {} labels",
                x.nrows(),
                y.len()
            )));
        }
        if x.ncols() != features.len() {
            return Err(FraudError::InvalidInput(format!(
                "{} columns but {} feature names",
                x.ncols(),
                features.len()
            )));
        }
        if y.is_empty() {
            return Err(FraudError::InvalidInput(
                "cannot fit a tree on zero samples".to_string(),
            ));
        }
        if x.ncols() == 0 {
            return Err(FraudError::InvalidInput(
                "cannot fit a tree on zero features".to_string(),
            ));
        }

        let mut importances = vec![0.0; features.len()];
        let indices: Vec<usize> = (0..y.len()).collect();
        let root = self.build_tree(x, y, features, &indices, 0, &mut importances, rng);

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }

        self.root = Some(root);
        self.features = features.to_vec();
        self.feature_importances = importances;
        Ok(())
    }

    fn leaf(y: &[bool], indices: &[usize]) -> TreeNode {
        let fraud = indices.iter().filter(|&&i| y[i]).count();
        TreeNode::Leaf {
            fraud_probability: if indices.is_empty() {
                0.0
            } else {
                fraud as f64 / indices.len() as f64
            },
            n_samples: indices.len(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_tree<R: Rng>(
        &self,
        x: &Array2<f64>,
        y: &[bool],
        features: &[FeatureId],
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
        rng: &mut R,
    ) -> TreeNode {
        let n_samples = indices.len();
        let fraud = indices.iter().filter(|&&i| y[i]).count();
        let legit = n_samples - fraud;

        let should_stop = depth >= self.max_depth
            || n_samples < 2 * self.min_leaf_size
            || fraud == 0
            || legit == 0;

        if should_stop {
            return Self::leaf(y, indices);
        }

        let Some(best) = self.find_best_split(x, y, indices, rng) else {
            return Self::leaf(y, indices);
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, best.column]] <= best.threshold);

        let parent_impurity = weighted_gini(fraud, legit, self.class_weight);
        importances[best.column] +=
            n_samples as f64 * (parent_impurity - best.impurity).max(0.0);

        let left = Box::new(self.build_tree(x, y, features, &left_indices, depth + 1, importances, rng));
        let right = Box::new(self.build_tree(x, y, features, &right_indices, depth + 1, importances, rng));

        TreeNode::Split {
            feature: features[best.column],
            threshold: best.threshold,
            left,
            right,
            n_samples,
            impurity: best.impurity,
        }
    }

    /// Lowest weighted impurity split over `ceil(sqrt(n_features))` random features
    fn find_best_split<R: Rng>(
        &self,
        x: &Array2<f64>,
        y: &[bool],
        indices: &[usize],
        rng: &mut R,
    ) -> Option<SplitCandidate> {
        let n_features = x.ncols();
        let n_candidates = ((n_features as f64).sqrt().ceil() as usize).clamp(1, n_features);
        let columns = rand::seq::index::sample(rng, n_features, n_candidates);
        let n = indices.len() as f64;

        let mut best: Option<SplitCandidate> = None;

        for column in columns.iter() {
            let mut values: Vec<f64> = indices.iter().map(|&i| x[[i, column]]).collect();
            values.sort_by(|a, b| a.total_cmp(b));
            values.dedup();

            for threshold in split_points(&values) {
                let mut left = (0usize, 0usize);
                let mut right = (0usize, 0usize);
                for &i in indices {
                    let side = if x[[i, column]] <= threshold {
                        &mut left
                    } else {
                        &mut right
                    };
                    if y[i] {
                        side.0 += 1;
                    } else {
                        side.1 += 1;
                    }
                }

                let left_count = left.0 + left.1;
                let right_count = right.0 + right.1;
                if left_count < self.min_leaf_size || right_count < self.min_leaf_size {
                    continue;
                }

                let impurity = left_count as f64 / n * weighted_gini(left.0, left.1, self.class_weight)
                    + right_count as f64 / n * weighted_gini(right.0, right.1, self.class_weight);

                if best.map_or(true, |b| impurity < b.impurity) {
                    best = Some(SplitCandidate {
                        column,
                        threshold,
                        impurity,
                    });
                }
            }
        }

        best
    }

    /// Fraud probability for one point
    pub fn predict_proba(&self, point: &FeatureVector) -> Result<f64> {
        self.root
            .as_ref()
            .map(|root| root.predict(point))
            .ok_or(FraudError::ModelNotTrained)
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }

    pub fn features(&self) -> &[FeatureId] {
        &self.features
    }

    /// Normalized impurity decrease per feature
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn depth(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::depth)
    }

    pub fn is_fitted(&self) -> bool {
        self.root.is_some()
    }
}

/// Midpoints between consecutive distinct values, at most [`MAX_SPLIT_POINTS`]
/// of them taken at evenly spaced positions
fn split_points(sorted_distinct: &[f64]) -> Vec<f64> {
    let midpoints: Vec<f64> = sorted_distinct
        .windows(2)
        .map(|w| (w[0] + w[1]) / 2.0)
        .collect();
    if midpoints.len() <= MAX_SPLIT_POINTS {
        return midpoints;
    }
    let step = midpoints.len() as f64 / MAX_SPLIT_POINTS as f64;
    (0..MAX_SPLIT_POINTS)
        .map(|i| midpoints[(i as f64 * step) as usize])
        .collect()
}

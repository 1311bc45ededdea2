//! Training configuration

use crate::ensemble::BlendWeights;
use crate::error::{FraudError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which scorer a training run produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Supervised class-weighted forest
    WeightedForest,
    IsolationForest,
    Lof,
    OneClass,
    /// Weighted blend of isolation forest, LOF and one-class scores
    Ensemble,
}

impl ModelKind {
    pub const ALL: [ModelKind; 5] = [
        ModelKind::WeightedForest,
        ModelKind::IsolationForest,
        ModelKind::Lof,
        ModelKind::OneClass,
        ModelKind::Ensemble,
    ];

    /// Whether training needs ground-truth labels
    pub fn is_supervised(&self) -> bool {
        matches!(self, ModelKind::WeightedForest)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::WeightedForest => "weighted_forest",
            ModelKind::IsolationForest => "isolation_forest",
            ModelKind::Lof => "lof",
            ModelKind::OneClass => "one_class",
            ModelKind::Ensemble => "ensemble",
        }
    }

    /// Tree count used when none is configured
    pub fn default_num_trees(&self) -> usize {
        match self {
            ModelKind::WeightedForest => 50,
            _ => 100,
        }
    }

    /// Decision threshold used when none is configured
    pub fn default_threshold(&self) -> f64 {
        match self {
            ModelKind::IsolationForest => 0.6,
            _ => 0.5,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = FraudError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        match key.as_str() {
            "weighted_forest" | "forest" | "random_forest" => Ok(ModelKind::WeightedForest),
            "isolation_forest" | "isolation" => Ok(ModelKind::IsolationForest),
            "lof" | "local_outlier_factor" => Ok(ModelKind::Lof),
            "one_class" | "one_class_svm" | "svm" => Ok(ModelKind::OneClass),
            "ensemble" | "blend" => Ok(ModelKind::Ensemble),
            _ => Err(FraudError::InvalidInput(format!("unknown model kind '{}'", s))),
        }
    }
}

/// Configuration of one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub model_kind: ModelKind,
    /// Trees per forest; defaults depend on the model kind
    pub num_trees: Option<usize>,
    /// Weighted forest depth cap
    pub max_depth: usize,
    /// Isolation tree depth cap; `ceil(log2(subsample_size))` when unset
    pub isolation_max_depth: Option<usize>,
    pub class_weight: f64,
    pub min_leaf_size: usize,
    pub max_bootstrap_size: usize,
    pub fraud_fraction: f64,
    pub fraud_oversample_factor: usize,
    /// Decision threshold; defaults depend on the model kind
    pub threshold: Option<f64>,
    /// Isolation forest subsample size
    pub subsample_size: usize,
    /// LOF neighbourhood size
    pub lof_neighbors: usize,
    /// One-class contamination fraction
    pub nu: f64,
    /// One-class RBF coefficient
    pub gamma: f64,
    pub max_support: usize,
    pub blend_weights: BlendWeights,
    /// Fraction of records held out for evaluation
    pub test_split: f64,
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            model_kind: ModelKind::WeightedForest,
            num_trees: None,
            max_depth: 10,
            isolation_max_depth: None,
            class_weight: 10.0,
            min_leaf_size: 2,
            max_bootstrap_size: 5000,
            fraud_fraction: 0.3,
            fraud_oversample_factor: 3,
            threshold: None,
            subsample_size: 256,
            lof_neighbors: 5,
            nu: 0.1,
            gamma: 0.1,
            max_support: 50,
            blend_weights: BlendWeights::default(),
            test_split: 0.2,
            seed: None,
        }
    }
}

impl TrainingConfig {
    pub fn new(model_kind: ModelKind) -> Self {
        Self {
            model_kind,
            ..Self::default()
        }
    }

    pub fn with_num_trees(mut self, n: usize) -> Self {
        self.num_trees = Some(n);
        self
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
        self.min_leaf_size = min_leaf;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_subsample_size(mut self, size: usize) -> Self {
        self.subsample_size = size;
        self
    }

    pub fn with_lof_neighbors(mut self, k: usize) -> Self {
        self.lof_neighbors = k;
        self
    }

    pub fn with_blend_weights(mut self, weights: BlendWeights) -> Self {
        self.blend_weights = weights;
        self
    }

    pub fn with_test_split(mut self, fraction: f64) -> Self {
        self.test_split = fraction;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Effective tree count
    pub fn num_trees(&self) -> usize {
        self.num_trees
            .unwrap_or_else(|| self.model_kind.default_num_trees())
    }

    /// Effective decision threshold
    pub fn threshold(&self) -> f64 {
        self.threshold
            .unwrap_or_else(|| self.model_kind.default_threshold())
    }

    /// Reject out-of-range settings
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(FraudError::invalid_parameter(name, v, "must be within [0, 1]"))
            }
        };

        if self.num_trees() == 0 {
            return Err(FraudError::invalid_parameter("num_trees", 0, "must be at least 1"));
        }
        unit("threshold", self.threshold())?;
        if !(0.0..1.0).contains(&self.test_split) {
            return Err(FraudError::invalid_parameter(
                "test_split",
                self.test_split,
                "must be within [0, 1)",
            ));
        }
        if self.max_depth == 0 {
            return Err(FraudError::invalid_parameter("max_depth", 0, "must be at least 1"));
        }
        if !(self.class_weight.is_finite() && self.class_weight > 0.0) {
            return Err(FraudError::invalid_parameter(
                "class_weight",
                self.class_weight,
                "must be positive",
            ));
        }
        if self.min_leaf_size == 0 {
            return Err(FraudError::invalid_parameter("min_leaf_size", 0, "must be at least 1"));
        }
        if self.subsample_size < 2 {
            return Err(FraudError::invalid_parameter(
                "subsample_size",
                self.subsample_size,
                "must be at least 2",
            ));
        }
        if self.lof_neighbors == 0 {
            return Err(FraudError::invalid_parameter("lof_neighbors", 0, "must be at least 1"));
        }
        unit("fraud_fraction", self.fraud_fraction)?;
        unit("nu", self.nu)?;
        if !(self.gamma.is_finite() && self.gamma > 0.0) {
            return Err(FraudError::invalid_parameter("gamma", self.gamma, "must be positive"));
        }
        if self.max_support == 0 {
            return Err(FraudError::invalid_parameter("max_support", 0, "must be at least 1"));
        }
        self.blend_weights.validate()
    }
}

//! One-class boundary scorer
//!
//! A coarse approximation of a one-class SVM: support points are the first
//! `max_support` training vectors with uniform weights, and the offset `rho`
//! is the empirical `nu`-quantile of the training decision values. No margin
//! optimization is performed, so the boundary is only as good as the support
//! subset it was given.

use crate::anomaly::{AnomalyDetector, NEUTRAL_SCORE};
use crate::error::{FraudError, Result};
use crate::features::{feature_matrix, select_features, FeatureId, FeatureVector};
use ndarray::{Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// One-class RBF boundary scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneClassScorer {
    /// Expected contamination fraction
    nu: f64,
    /// RBF kernel coefficient
    gamma: f64,
    /// Maximum number of support points kept
    max_support: usize,
    requested_features: Vec<FeatureId>,
    features: Vec<FeatureId>,
    support: Option<Array2<f64>>,
    /// Column means of the support set, used for unknown features
    means: Vec<f64>,
    weight: f64,
    rho: f64,
}

impl Default for OneClassScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl OneClassScorer {
    pub fn new() -> Self {
        Self {
            nu: 0.1,
            gamma: 0.1,
            max_support: 50,
            requested_features: crate::anomaly::LocalOutlierFactor::DEFAULT_FEATURES.to_vec(),
            features: Vec::new(),
            support: None,
            means: Vec::new(),
            weight: 0.0,
            rho: 0.0,
        }
    }

    pub fn with_nu(mut self, nu: f64) -> Self {
        self.nu = nu.clamp(0.0, 1.0);
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_max_support(mut self, max_support: usize) -> Self {
        self.max_support = max_support.max(1);
        self
    }

    pub fn with_features(mut self, features: Vec<FeatureId>) -> Self {
        self.requested_features = features;
        self
    }

    pub fn nu(&self) -> f64 {
        self.nu
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Decision offset learned at fit time
    pub fn rho(&self) -> f64 {
        self.rho
    }

    pub fn features(&self) -> &[FeatureId] {
        &self.features
    }

    pub fn n_support(&self) -> usize {
        self.support.as_ref().map_or(0, |s| s.nrows())
    }

    fn decision_dense(&self, support: &Array2<f64>, point: &[f64]) -> f64 {
        support
            .axis_iter(Axis(0))
            .map(|s| {
                let norm_sq: f64 = s
                    .iter()
                    .zip(point.iter())
                    .map(|(a, b)| (a - b).powi(2))
                    .sum();
                self.weight * (-self.gamma * norm_sq).exp()
            })
            .sum()
    }

    /// Weighted RBF similarity to the support set; `None` before fitting
    pub fn decision_function(&self, point: &FeatureVector) -> Option<f64> {
        let support = self.support.as_ref()?;
        let dense = point.dense(&self.features, &self.means);
        Some(self.decision_dense(support, &dense))
    }
}

impl AnomalyDetector for OneClassScorer {
    fn fit(&mut self, data: &[FeatureVector]) -> Result<()> {
        if data.is_empty() {
            return Err(FraudError::InvalidInput(
                "cannot fit one-class scorer on an empty dataset".to_string(),
            ));
        }
        if !(self.gamma.is_finite() && self.gamma > 0.0) {
            return Err(FraudError::invalid_parameter("gamma", self.gamma, "must be positive"));
        }

        let features = select_features(data, &self.requested_features)?;
        let points = feature_matrix(data, &features);
        let m = self.max_support.min(points.nrows());
        let support = points.slice(ndarray::s![..m, ..]).to_owned();
        let means = support
            .mean_axis(Axis(0))
            .map(|v| v.to_vec())
            .unwrap_or_else(|| vec![0.0; features.len()]);

        self.weight = 1.0 / m as f64;

        let mut decisions: Vec<f64> = (0..points.nrows())
            .into_par_iter()
            .map(|i| self.decision_dense(&support, &points.row(i).to_vec()))
            .collect();
        decisions.sort_by(|a, b| a.total_cmp(b));

        let n = decisions.len();
        let idx = ((self.nu * n as f64).floor() as usize).min(n - 1);
        let rho = decisions[idx];

        tracing::info!(support = m, rho, nu = self.nu, "One-class scorer fitted");

        self.features = features;
        self.support = Some(support);
        self.means = means;
        self.rho = rho;
        Ok(())
    }

    /// `0.5` at the boundary, rising towards 1 as the decision value falls below `rho`
    fn score(&self, point: &FeatureVector) -> f64 {
        match self.decision_function(point) {
            Some(f) if self.rho > 0.0 => (0.5 + 0.5 * (self.rho - f) / self.rho).clamp(0.0, 1.0),
            _ => NEUTRAL_SCORE,
        }
    }

    fn threshold(&self) -> f64 {
        NEUTRAL_SCORE
    }

    fn is_anomaly(&self, point: &FeatureVector) -> bool {
        self.decision_function(point)
            .map_or(false, |f| f < self.rho)
    }
}

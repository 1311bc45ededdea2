//! Unsupervised anomaly scorers
//!
//! Provides the unsupervised members of the fraud ensemble:
//! - Isolation Forest (random-split isolation trees)
//! - Local Outlier Factor (density ratio over a reference set)
//! - One-class boundary scorer (RBF decision function with an empirical threshold)
//!
//! All scorers map a [`FeatureVector`] to an anomaly score in `[0, 1]`,
//! higher meaning more anomalous.

mod isolation_forest;
mod lof;
mod one_class;

pub use isolation_forest::{average_path_length, IsolationForest, IsolationTree, EULER_GAMMA};
pub use lof::{LocalOutlierFactor, LofScore};
pub use one_class::OneClassScorer;

use crate::error::Result;
use crate::features::FeatureVector;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Neutral score returned when a scorer cannot produce a meaningful value
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Anomaly detection result over a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyResult {
    /// Anomaly scores (higher = more anomalous)
    pub scores: Array1<f64>,
    /// Per-point anomaly flags
    pub flags: Vec<bool>,
    /// Threshold used for classification
    pub threshold: f64,
    /// Number of anomalies detected
    pub n_anomalies: usize,
}

/// Trait for unsupervised anomaly scorers
pub trait AnomalyDetector: Send + Sync {
    /// Fit the scorer on training vectors
    fn fit(&mut self, data: &[FeatureVector]) -> Result<()>;

    /// Anomaly score in `[0, 1]` for one point
    fn score(&self, point: &FeatureVector) -> f64;

    /// Decision threshold on the score
    fn threshold(&self) -> f64;

    /// Whether a point is anomalous
    fn is_anomaly(&self, point: &FeatureVector) -> bool {
        self.score(point) > self.threshold()
    }

    /// Scores for a batch of points
    fn score_batch(&self, points: &[FeatureVector]) -> Array1<f64> {
        points.iter().map(|p| self.score(p)).collect()
    }

    /// Scores and flags for a batch of points
    fn detect(&self, points: &[FeatureVector]) -> AnomalyResult {
        let scores = self.score_batch(points);
        let flags: Vec<bool> = points.iter().map(|p| self.is_anomaly(p)).collect();
        let n_anomalies = flags.iter().filter(|f| **f).count();
        AnomalyResult {
            scores,
            flags,
            threshold: self.threshold(),
            n_anomalies,
        }
    }
}

//! Local Outlier Factor (LOF) anomaly detection

use crate::anomaly::{AnomalyDetector, NEUTRAL_SCORE};
use crate::error::{FraudError, Result};
use crate::features::{feature_matrix, select_features, FeatureId, FeatureVector};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Ordered float for priority queue
#[derive(Debug, Clone, Copy)]
struct OrderedFloat(f64, usize);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for OrderedFloat {}

impl PartialOrd for OrderedFloat {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedFloat {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: peek() returns the farthest of the current k
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

/// Outcome of scoring one point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LofScore {
    /// Raw LOF and its `[0, 1]` normalization `(lof - 1) / 4`
    Score { lof: f64, normalized: f64 },
    /// Raw LOF was not finite; scored as neutral
    Degenerate,
    /// Reference set smaller than k
    InsufficientData,
}

impl LofScore {
    /// Score in `[0, 1]`; neutral for degenerate or insufficient data
    pub fn value(&self) -> f64 {
        match self {
            LofScore::Score { normalized, .. } => *normalized,
            LofScore::Degenerate | LofScore::InsufficientData => NEUTRAL_SCORE,
        }
    }

    /// Whether the score rests on enough reference data
    pub fn is_confident(&self) -> bool {
        !matches!(self, LofScore::InsufficientData)
    }
}

/// Stored reference set with precomputed neighbourhood statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ReferenceSet {
    points: Array2<f64>,
    /// Column means, substituted for features a query point lacks
    means: Vec<f64>,
    k_distances: Array1<f64>,
    /// Infinite where a point sits on k exact duplicates
    #[serde(with = "unbounded")]
    lrd: Array1<f64>,
}

/// Stores infinite densities as `null` so the set survives JSON
mod unbounded {
    use ndarray::Array1;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(values: &Array1<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded: Vec<Option<f64>> = values
            .iter()
            .map(|v| Some(*v).filter(|v| v.is_finite()))
            .collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Array1<f64>, D::Error> {
        let encoded = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(encoded
            .into_iter()
            .map(|v| v.unwrap_or(f64::INFINITY))
            .collect())
    }
}

/// Local Outlier Factor anomaly detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalOutlierFactor {
    /// Number of neighbors
    n_neighbors: usize,
    /// Features distances are computed over
    requested_features: Vec<FeatureId>,
    /// Normalized score above which a point is anomalous
    threshold: f64,
    /// Features actually used (requested features present in all training rows)
    features: Vec<FeatureId>,
    reference: Option<ReferenceSet>,
}

impl LocalOutlierFactor {
    /// Default feature subset
    pub const DEFAULT_FEATURES: [FeatureId; 6] = [
        FeatureId::AmountZScore,
        FeatureId::TimeRisk,
        FeatureId::MerchantRisk,
        FeatureId::LocationRisk,
        FeatureId::DeviceRisk,
        FeatureId::Velocity,
    ];

    /// Create new LOF detector
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors: n_neighbors.max(1),
            requested_features: Self::DEFAULT_FEATURES.to_vec(),
            threshold: 0.5,
            features: Vec::new(),
            reference: None,
        }
    }

    /// Set the feature subset
    pub fn with_features(mut self, features: Vec<FeatureId>) -> Self {
        self.requested_features = features;
        self
    }

    /// Set decision threshold on the normalized score
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    /// Features distances are computed over
    pub fn features(&self) -> &[FeatureId] {
        &self.features
    }

    /// Number of stored reference points
    pub fn reference_size(&self) -> usize {
        self.reference.as_ref().map_or(0, |r| r.points.nrows())
    }

    /// Euclidean distance between two points
    fn euclidean_distance(a: &[f64], b: ArrayView1<f64>) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// Find k nearest neighbors and their distances
    fn k_nearest_neighbors(
        point: &[f64],
        data: &Array2<f64>,
        k: usize,
        exclude_self: Option<usize>,
    ) -> Vec<(usize, f64)> {
        let mut heap: BinaryHeap<OrderedFloat> = BinaryHeap::with_capacity(k + 1);

        for (i, row) in data.axis_iter(Axis(0)).enumerate() {
            if Some(i) == exclude_self {
                continue;
            }

            let dist = Self::euclidean_distance(point, row);

            if heap.len() < k {
                heap.push(OrderedFloat(dist, i));
            } else if let Some(&OrderedFloat(max_dist, _)) = heap.peek() {
                if dist < max_dist {
                    heap.pop();
                    heap.push(OrderedFloat(dist, i));
                }
            }
        }

        heap.into_iter().map(|OrderedFloat(d, i)| (i, d)).collect()
    }

    /// Distance to the k-th nearest neighbor
    fn k_distance(neighbors: &[(usize, f64)]) -> f64 {
        neighbors.iter().map(|(_, d)| *d).fold(0.0, f64::max)
    }

    /// Local reachability density: `k / sum(max(k-distance(nb), d(x, nb)))`
    fn local_reachability_density(neighbors: &[(usize, f64)], k_distances: &Array1<f64>) -> f64 {
        if neighbors.is_empty() {
            return 0.0;
        }

        let sum_reach_dist: f64 = neighbors
            .iter()
            .map(|&(idx, dist)| k_distances[idx].max(dist))
            .sum();

        if sum_reach_dist == 0.0 {
            f64::INFINITY
        } else {
            neighbors.len() as f64 / sum_reach_dist
        }
    }

    /// Score one point against the reference set
    pub fn score_point(&self, point: &FeatureVector) -> LofScore {
        let Some(reference) = &self.reference else {
            return LofScore::InsufficientData;
        };
        if reference.points.nrows() < self.n_neighbors {
            tracing::debug!(
                reference = reference.points.nrows(),
                k = self.n_neighbors,
                "LOF reference set smaller than k"
            );
            return LofScore::InsufficientData;
        }

        let dense = point.dense(&self.features, &reference.means);
        let neighbors =
            Self::k_nearest_neighbors(&dense, &reference.points, self.n_neighbors, None);
        let lrd_point = Self::local_reachability_density(&neighbors, &reference.k_distances);

        let lof = neighbors
            .iter()
            .map(|&(idx, _)| reference.lrd[idx] / lrd_point)
            .sum::<f64>()
            / neighbors.len() as f64;

        if !lof.is_finite() {
            return LofScore::Degenerate;
        }

        LofScore::Score {
            lof,
            normalized: ((lof - 1.0) / 4.0).clamp(0.0, 1.0),
        }
    }
}

impl Default for LocalOutlierFactor {
    fn default() -> Self {
        Self::new(5)
    }
}

impl AnomalyDetector for LocalOutlierFactor {
    fn fit(&mut self, data: &[FeatureVector]) -> Result<()> {
        if data.is_empty() {
            return Err(FraudError::InvalidInput(
                "cannot fit LOF on an empty dataset".to_string(),
            ));
        }

        let features = select_features(data, &self.requested_features)?;
        let points = feature_matrix(data, &features);
        let n = points.nrows();
        let means = points
            .mean_axis(Axis(0))
            .map(|m| m.to_vec())
            .unwrap_or_else(|| vec![0.0; features.len()]);

        if n < self.n_neighbors {
            tracing::warn!(
                reference = n,
                k = self.n_neighbors,
                "LOF reference set smaller than k; scores will be placeholders"
            );
        }

        // Neighbourhoods of the reference points exclude the point itself
        let k = self.n_neighbors.min(n.saturating_sub(1)).max(1);
        let neighborhoods: Vec<Vec<(usize, f64)>> = (0..n)
            .into_par_iter()
            .map(|i| {
                let row = points.row(i).to_vec();
                Self::k_nearest_neighbors(&row, &points, k, Some(i))
            })
            .collect();

        let k_distances: Array1<f64> = neighborhoods.iter().map(|nb| Self::k_distance(nb)).collect();
        let lrd: Array1<f64> = neighborhoods
            .iter()
            .map(|nb| Self::local_reachability_density(nb, &k_distances))
            .collect();

        tracing::info!(reference = n, k = self.n_neighbors, features = features.len(), "LOF fitted");

        self.features = features;
        self.reference = Some(ReferenceSet {
            points,
            means,
            k_distances,
            lrd,
        });
        Ok(())
    }

    fn score(&self, point: &FeatureVector) -> f64 {
        self.score_point(point).value()
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f64, y: f64) -> FeatureVector {
        FeatureVector::from_pairs([(FeatureId::Amount, x), (FeatureId::Velocity, y)])
    }

    fn cluster_and_outlier() -> Vec<FeatureVector> {
        vec![
            point(1.0, 1.0),
            point(1.1, 1.0),
            point(1.0, 1.1),
            point(1.1, 1.1),
            point(1.05, 1.05),
            point(10.0, 10.0),
        ]
    }

    fn fitted(k: usize) -> LocalOutlierFactor {
        let mut lof = LocalOutlierFactor::new(k)
            .with_features(vec![FeatureId::Amount, FeatureId::Velocity]);
        lof.fit(&cluster_and_outlier()).unwrap();
        lof
    }

    #[test]
    fn test_outlier_scores_high() {
        let lof = fitted(3);
        let data = cluster_and_outlier();
        assert!(lof.score(&data[5]) > 0.5);
        assert!(lof.is_anomaly(&data[5]));
    }

    #[test]
    fn test_cluster_member_scores_low() {
        let lof = fitted(3);
        let data = cluster_and_outlier();
        assert!(lof.score(&data[0]) < 0.3);
        assert!(lof.score(&point(1.02, 1.03)) < 0.3);
    }

    #[test]
    fn test_reference_smaller_than_k_is_placeholder() {
        let mut lof = LocalOutlierFactor::new(10)
            .with_features(vec![FeatureId::Amount, FeatureId::Velocity]);
        lof.fit(&cluster_and_outlier()).unwrap();

        let outcome = lof.score_point(&point(50.0, 50.0));
        assert_eq!(outcome, LofScore::InsufficientData);
        assert!(!outcome.is_confident());
        assert_eq!(lof.score(&point(50.0, 50.0)), NEUTRAL_SCORE);
    }

    #[test]
    fn test_duplicate_points_are_neutral() {
        let data: Vec<FeatureVector> = (0..6).map(|_| point(2.0, 2.0)).collect();
        let mut lof = LocalOutlierFactor::new(3)
            .with_features(vec![FeatureId::Amount, FeatureId::Velocity]);
        lof.fit(&data).unwrap();

        assert_eq!(lof.score_point(&point(2.0, 2.0)), LofScore::Degenerate);
        assert_eq!(lof.score(&point(2.0, 2.0)), NEUTRAL_SCORE);
    }

    #[test]
    fn test_infinite_density_survives_json() {
        let data: Vec<FeatureVector> = (0..6).map(|_| point(2.0, 2.0)).collect();
        let mut lof = LocalOutlierFactor::new(3)
            .with_features(vec![FeatureId::Amount, FeatureId::Velocity]);
        lof.fit(&data).unwrap();

        let json = serde_json::to_string(&lof).unwrap();
        let back: LocalOutlierFactor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, lof);
    }

    #[test]
    fn test_missing_feature_uses_reference_mean() {
        let lof = fitted(3);
        let partial = FeatureVector::from_pairs([(FeatureId::Amount, 1.05)]);
        let s = lof.score(&partial);
        assert!((0.0..=1.0).contains(&s));
    }

    #[test]
    fn test_unfitted_is_insufficient() {
        let lof = LocalOutlierFactor::new(3);
        assert_eq!(lof.score_point(&point(1.0, 1.0)), LofScore::InsufficientData);
    }

    #[test]
    fn test_fit_requires_features() {
        let mut lof = LocalOutlierFactor::new(3).with_features(vec![FeatureId::DeviceRisk]);
        let err = lof.fit(&cluster_and_outlier()).unwrap_err();
        assert!(matches!(err, FraudError::InvalidInput(_)));
    }
}

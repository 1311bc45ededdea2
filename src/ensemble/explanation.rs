//! Human-readable reasons behind a score

use super::aggregator::SubScores;
use crate::features::{FeatureId, FeatureVector};
use crate::training::ModelKind;

/// Reason given when a flagged transaction tripped no individual rule
pub const WEAK_SIGNALS_REASON: &str = "Multiple weak signals combined";

/// Sub-scores above this value are reported as a reason
const SCORER_REASON_THRESHOLD: f64 = 0.7;

/// Reasons for a score.
///
/// Never empty when `flagged` is true.
pub fn explain(features: &FeatureVector, scores: &SubScores, flagged: bool) -> Vec<String> {
    let mut reasons = Vec::new();

    if let Some(z) = features.get(FeatureId::AmountZScore).filter(|z| *z > 2.0) {
        reasons.push(format!(
            "Amount is {:.1} standard deviations from the average",
            z
        ));
    }
    if features.get(FeatureId::TimeRisk).map_or(false, |r| r > 0.5) {
        match features.get(FeatureId::Hour) {
            Some(hour) => reasons.push(format!("Unusual transaction hour ({:02}:00)", hour as u32)),
            None => reasons.push("Unusual transaction hour".to_string()),
        }
    }
    if features.get(FeatureId::MerchantRisk).map_or(false, |r| r > 0.6) {
        reasons.push("High-risk merchant category".to_string());
    }
    if features.get(FeatureId::LocationRisk).map_or(false, |r| r > 0.6) {
        reasons.push("High-risk location".to_string());
    }
    if features.get(FeatureId::DeviceRisk).map_or(false, |r| r > 0.6) {
        reasons.push("High-risk device".to_string());
    }
    if let Some(v) = features.get(FeatureId::Velocity).filter(|v| *v > 3.0) {
        reasons.push(format!("High transaction velocity ({})", v));
    }

    for (kind, score) in scores.iter() {
        if score > SCORER_REASON_THRESHOLD && !scores.is_low_confidence(kind) {
            let label = match kind {
                ModelKind::WeightedForest => "Fraud classifier",
                ModelKind::IsolationForest => "Isolation forest",
                ModelKind::Lof => "Local density",
                ModelKind::OneClass => "One-class boundary",
                ModelKind::Ensemble => continue,
            };
            reasons.push(format!("{} score {:.2}", label, score));
        }
    }

    if flagged && reasons.is_empty() {
        reasons.push(WEAK_SIGNALS_REASON.to_string());
    }
    reasons
}

//! Feature extraction from raw transactions

use super::transaction::Transaction;
use super::vector::{FeatureId, FeatureVector, ANONYMIZED_COUNT};
use serde::{Deserialize, Serialize};

/// Merchant category risk lookup (keyword, risk)
const MERCHANT_RISK: &[(&str, f64)] = &[
    ("gambling", 0.9),
    ("casino", 0.9),
    ("cryptocurrency", 0.85),
    ("crypto", 0.85),
    ("wire transfer", 0.8),
    ("gift card", 0.8),
    ("jewelry", 0.7),
    ("electronics", 0.6),
    ("online", 0.5),
    ("travel", 0.5),
    ("entertainment", 0.4),
    ("clothing", 0.3),
    ("restaurant", 0.2),
    ("gas", 0.2),
    ("pharmacy", 0.15),
    ("grocery", 0.1),
    ("utilities", 0.1),
];

/// Risk assigned to merchants missing from the lookup table
pub const DEFAULT_MERCHANT_RISK: f64 = 0.3;

/// Risk assigned to unrecognized device risk labels
pub const DEFAULT_DEVICE_RISK: f64 = 0.5;

const DEVICE_FIELDS: &[&str] = &["devicerisk", "device"];

/// Merchant category risk score in [0, 1]
pub fn merchant_risk(merchant: &str) -> f64 {
    let merchant = merchant.trim().to_lowercase();
    if let Some((_, risk)) = MERCHANT_RISK.iter().find(|(name, _)| *name == merchant) {
        return *risk;
    }
    MERCHANT_RISK
        .iter()
        .find(|(name, _)| merchant.contains(name))
        .map(|(_, risk)| *risk)
        .unwrap_or(DEFAULT_MERCHANT_RISK)
}

/// Location risk score from substring rules
pub fn location_risk(location: &str) -> f64 {
    let location = location.to_lowercase();
    if location.contains("high risk") || location.contains("high-risk") {
        0.9
    } else if location.contains("international") {
        0.7
    } else {
        0.1
    }
}

/// Device risk label to numeric risk
pub fn device_risk(label: &str) -> f64 {
    match label.trim().to_lowercase().as_str() {
        "high" => 0.9,
        "medium" => 0.5,
        "low" => 0.1,
        _ => DEFAULT_DEVICE_RISK,
    }
}

/// Time-of-day risk bucket
pub fn time_risk(hour: u32) -> f64 {
    match hour {
        0..=5 => 0.8,
        22 | 23 => 0.6,
        _ => 0.1,
    }
}

/// Running amount statistics (Welford's algorithm)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AmountStatistics {
    count: usize,
    mean: f64,
    m2: f64,
}

impl AmountStatistics {
    /// Compute statistics over a sequence of amounts
    pub fn from_amounts(amounts: impl IntoIterator<Item = f64>) -> Self {
        let mut stats = Self::default();
        for amount in amounts {
            stats.push(amount);
        }
        stats
    }

    /// Add one observation
    pub fn push(&mut self, amount: f64) {
        if !amount.is_finite() {
            return;
        }
        self.count += 1;
        let delta = amount - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (amount - self.mean);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population standard deviation
    pub fn std_dev(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.m2 / self.count as f64).sqrt()
        }
    }

    /// `|amount - mean| / std_dev`, or 0 when no spread has been observed
    pub fn z_score(&self, amount: f64) -> f64 {
        let std = self.std_dev();
        if self.count == 0 || std <= 0.0 {
            0.0
        } else {
            (amount - self.mean).abs() / std
        }
    }
}

/// Turns transactions into feature vectors.
///
/// Extraction is pure; the only state is the amount statistics used for
/// z-scores, refreshed explicitly by [`FeatureExtractor::update_statistics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureExtractor {
    stats: AmountStatistics,
}

impl FeatureExtractor {
    /// Extractor with no statistics (z-scores are 0)
    pub fn new() -> Self {
        Self::default()
    }

    /// Extractor with precomputed statistics
    pub fn with_statistics(stats: AmountStatistics) -> Self {
        Self { stats }
    }

    /// Recompute amount statistics from a training set. Call before every retrain.
    pub fn update_statistics(&mut self, training: &[Transaction]) {
        self.stats = AmountStatistics::from_amounts(training.iter().filter_map(Transaction::amount));
        tracing::debug!(
            count = self.stats.count(),
            mean = self.stats.mean(),
            std_dev = self.stats.std_dev(),
            "Amount statistics refreshed"
        );
    }

    /// Current amount statistics
    pub fn statistics(&self) -> &AmountStatistics {
        &self.stats
    }

    /// Extract the feature vector of a transaction
    pub fn extract(&self, tx: &Transaction) -> FeatureVector {
        let mut v = FeatureVector::new();

        if let Some(amount) = tx.amount() {
            v.set(FeatureId::Amount, amount);
            v.set(FeatureId::AmountZScore, self.stats.z_score(amount));
        }

        if let Some((hour, day)) = tx.clock() {
            v.set(FeatureId::Hour, hour as f64);
            v.set(FeatureId::DayOfWeek, day as f64);
            v.set(FeatureId::TimeRisk, time_risk(hour));
        }

        if let Some(merchant) = tx.merchant() {
            v.set(FeatureId::MerchantRisk, merchant_risk(merchant));
        }
        if let Some(location) = tx.location() {
            v.set(FeatureId::LocationRisk, location_risk(location));
        }

        let device = DEVICE_FIELDS.iter().find_map(|name| tx.field(name));
        if let Some(device) = device {
            let risk = match device.as_str() {
                Some(label) => label
                    .trim()
                    .parse::<f64>()
                    .map(|r| r.clamp(0.0, 1.0))
                    .unwrap_or_else(|_| device_risk(label)),
                None => device.as_f64().map(|r| r.clamp(0.0, 1.0)).unwrap_or(DEFAULT_DEVICE_RISK),
            };
            v.set(FeatureId::DeviceRisk, risk);
        }

        if let Some(velocity) = tx.number("velocity") {
            v.set(FeatureId::Velocity, velocity);
        }
        if let Some(frequency) = tx.number("frequency") {
            v.set(FeatureId::Frequency, frequency);
        }

        for n in 1..=ANONYMIZED_COUNT as u8 {
            if let Some(value) = tx.number(&format!("V{}", n)) {
                v.set(FeatureId::Anonymized(n), value);
            }
        }

        v
    }

    /// Extract a batch of transactions
    pub fn extract_batch(&self, txs: &[Transaction]) -> Vec<FeatureVector> {
        txs.iter().map(|tx| self.extract(tx)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_tables() {
        assert_eq!(merchant_risk("Gambling"), 0.9);
        assert_eq!(merchant_risk("online electronics store"), 0.6);
        assert_eq!(merchant_risk("bookshop"), DEFAULT_MERCHANT_RISK);

        assert_eq!(location_risk("High Risk Region"), 0.9);
        assert_eq!(location_risk("International - FR"), 0.7);
        assert_eq!(location_risk("Springfield"), 0.1);

        assert_eq!(device_risk("HIGH"), 0.9);
        assert_eq!(device_risk("unknown"), DEFAULT_DEVICE_RISK);

        assert_eq!(time_risk(3), 0.8);
        assert_eq!(time_risk(23), 0.6);
        assert_eq!(time_risk(14), 0.1);
    }

    #[test]
    fn test_statistics_match_direct_computation() {
        let stats = AmountStatistics::from_amounts([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(stats.count(), 8);
        assert!((stats.mean() - 5.0).abs() < 1e-12);
        assert!((stats.std_dev() - 2.0).abs() < 1e-12);
        assert!((stats.z_score(9.0) - 2.0).abs() < 1e-12);
        assert!((stats.z_score(1.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_zscore_zero_without_statistics() {
        let extractor = FeatureExtractor::new();
        let v = extractor.extract(&Transaction::new().with_field("amount", 5000.0));
        assert_eq!(v.get(FeatureId::AmountZScore), Some(0.0));
    }

    #[test]
    fn test_extract_full_record() {
        let training: Vec<Transaction> = [10.0, 20.0, 30.0]
            .iter()
            .map(|a| Transaction::new().with_field("amount", *a))
            .collect();
        let mut extractor = FeatureExtractor::new();
        extractor.update_statistics(&training);

        let tx = Transaction::new()
            .with_field("amount", 120.0)
            .with_field("timestamp", "2024-03-05T02:15:00Z")
            .with_field("merchant", "casino")
            .with_field("location", "international")
            .with_field("deviceRisk", "medium")
            .with_field("velocity", 4)
            .with_field("V3", -1.5);

        let v = extractor.extract(&tx);
        assert_eq!(v.get(FeatureId::Amount), Some(120.0));
        assert_eq!(v.get(FeatureId::Hour), Some(2.0));
        // 2024-03-05 is a Tuesday
        assert_eq!(v.get(FeatureId::DayOfWeek), Some(2.0));
        assert_eq!(v.get(FeatureId::TimeRisk), Some(0.8));
        assert_eq!(v.get(FeatureId::MerchantRisk), Some(0.9));
        assert_eq!(v.get(FeatureId::LocationRisk), Some(0.7));
        assert_eq!(v.get(FeatureId::DeviceRisk), Some(0.5));
        assert_eq!(v.get(FeatureId::Velocity), Some(4.0));
        assert_eq!(v.get(FeatureId::Anonymized(3)), Some(-1.5));
        assert!(v.get(FeatureId::AmountZScore).unwrap() > 10.0);
        assert_eq!(v.get(FeatureId::Frequency), None);
    }

    #[test]
    fn test_elapsed_time_column() {
        // 26 hours after dataset start
        let tx = Transaction::new().with_field("Time", 93_600.0).with_field("Amount", 1.0);
        let v = FeatureExtractor::new().extract(&tx);
        assert_eq!(v.get(FeatureId::Hour), Some(2.0));
        assert_eq!(v.get(FeatureId::DayOfWeek), Some(1.0));
    }

    #[test]
    fn test_numeric_device_risk() {
        let tx = Transaction::new().with_field("deviceRisk", 0.75);
        let v = FeatureExtractor::new().extract(&tx);
        assert_eq!(v.get(FeatureId::DeviceRisk), Some(0.75));
    }
}

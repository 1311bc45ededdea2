//! Rule-based behavioural scoring
//!
//! Each rule compares a transaction with the user's history and contributes
//! a fixed weight when it fires. The transaction is then folded into the
//! profile, so the assessment always reflects history *before* it.

use super::profile::BehaviorProfile;
use super::store::ProfileStore;
use crate::ensemble::RiskTier;
use crate::error::{FraudError, Result};
use crate::features::Transaction;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Rule thresholds and weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorRules {
    /// Amount above `multiplier * average` fires the amount rule
    pub amount_multiplier: f64,
    pub amount_weight: f64,
    pub unusual_hour_weight: f64,
    pub new_merchant_weight: f64,
    pub new_location_weight: f64,
    /// Mean recent risk above this fires the recent-risk rule
    pub recent_risk_threshold: f64,
    pub recent_risk_weight: f64,
    /// History needed before the hour rule applies
    pub min_history: u64,
    /// Score above which a transaction is suspicious
    pub threshold: f64,
}

impl Default for BehaviorRules {
    fn default() -> Self {
        Self {
            amount_multiplier: 3.0,
            amount_weight: 0.3,
            unusual_hour_weight: 0.2,
            new_merchant_weight: 0.2,
            new_location_weight: 0.2,
            recent_risk_threshold: 0.5,
            recent_risk_weight: 0.1,
            min_history: 5,
            threshold: 0.5,
        }
    }
}

/// Outcome of a behavioural assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorAssessment {
    pub user_id: String,
    /// Sum of fired rule weights, clamped to [0, 1]
    pub risk_score: f64,
    pub risk_tier: RiskTier,
    pub is_suspicious: bool,
    pub reasons: Vec<String>,
}

/// Scores transactions against per-user profiles
#[derive(Debug, Clone)]
pub struct BehavioralScorer {
    store: Arc<ProfileStore>,
    rules: BehaviorRules,
}

impl Default for BehavioralScorer {
    fn default() -> Self {
        Self::new(Arc::new(ProfileStore::default()))
    }
}

impl BehavioralScorer {
    pub fn new(store: Arc<ProfileStore>) -> Self {
        Self {
            store,
            rules: BehaviorRules::default(),
        }
    }

    pub fn with_rules(mut self, rules: BehaviorRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn rules(&self) -> &BehaviorRules {
        &self.rules
    }

    pub fn store(&self) -> &Arc<ProfileStore> {
        &self.store
    }

    /// Assess a transaction and record it in the user's profile.
    ///
    /// The record must carry a user id.
    pub fn assess(&self, tx: &Transaction) -> Result<BehaviorAssessment> {
        let user_id = tx
            .user_id()
            .ok_or_else(|| FraudError::InvalidInput("transaction has no user id".to_string()))?;
        let amount = tx.amount();
        let hour = tx.clock().map(|(hour, _)| hour);
        let merchant = tx.merchant();
        let location = tx.location();

        let (risk_score, reasons) = self.store.with_profile(&user_id, |profile| {
            let (score, reasons) = self.evaluate(profile, amount, hour, merchant, location);
            profile.record(amount, hour, merchant, location, score);
            (score, reasons)
        });

        let is_suspicious = risk_score > self.rules.threshold;
        if is_suspicious {
            tracing::debug!(user_id = %user_id, score = risk_score, "Suspicious behaviour");
        }
        Ok(BehaviorAssessment {
            user_id,
            risk_score,
            risk_tier: RiskTier::from_score(risk_score),
            is_suspicious,
            reasons,
        })
    }

    fn evaluate(
        &self,
        profile: &BehaviorProfile,
        amount: Option<f64>,
        hour: Option<u32>,
        merchant: Option<&str>,
        location: Option<&str>,
    ) -> (f64, Vec<String>) {
        let rules = &self.rules;
        let mut score = 0.0;
        let mut reasons = Vec::new();

        if profile.is_new() {
            return (score, reasons);
        }

        if let Some(amount) = amount {
            let average = profile.average_amount;
            if profile.has_amount_history() && average > 0.0 && amount > average * rules.amount_multiplier {
                score += rules.amount_weight;
                reasons.push(format!(
                    "Amount {:.2} is {:.1}x the user's average of {:.2}",
                    amount,
                    amount / average,
                    average
                ));
            }
        }

        if let Some(hour) = hour {
            if profile.transaction_count >= rules.min_history && !profile.has_seen_hour(hour) {
                score += rules.unusual_hour_weight;
                reasons.push(format!("First transaction at hour {:02}:00", hour));
            }
        }

        if let Some(merchant) = merchant {
            if profile.merchant_frequency(merchant) == 0 {
                score += rules.new_merchant_weight;
                reasons.push(format!("New merchant: {}", merchant));
            }
        }

        if let Some(location) = location {
            if profile.location_frequency(location) == 0 {
                score += rules.new_location_weight;
                reasons.push(format!("New location: {}", location));
            }
        }

        let recent = profile.average_recent_risk();
        if recent > rules.recent_risk_threshold {
            score += rules.recent_risk_weight;
            reasons.push(format!("Elevated recent risk ({:.2})", recent));
        }

        (f64::clamp(score, 0.0, 1.0), reasons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(amount: f64, hour: u32, merchant: &str, location: &str) -> Transaction {
        Transaction::new()
            .with_field("user_id", "u1")
            .with_field("Amount", amount)
            .with_field("Time", hour as f64 * 3600.0)
            .with_field("merchant", merchant)
            .with_field("location", location)
    }

    fn warmed_up() -> BehavioralScorer {
        let scorer = BehavioralScorer::default();
        for i in 0..6 {
            scorer.assess(&tx(40.0 + i as f64, 12, "grocery", "Berlin")).unwrap();
        }
        scorer
    }

    #[test]
    fn test_first_transaction_is_baseline() {
        let scorer = BehavioralScorer::default();
        let a = scorer.assess(&tx(5000.0, 3, "casino", "Macau")).unwrap();
        assert_eq!(a.risk_score, 0.0);
        assert!(a.reasons.is_empty());
        assert_eq!(scorer.store().get("u1").unwrap().transaction_count, 1);
    }

    #[test]
    fn test_familiar_transaction_scores_zero() {
        let scorer = warmed_up();
        let a = scorer.assess(&tx(45.0, 12, "Grocery", "berlin")).unwrap();
        assert_eq!(a.risk_score, 0.0);
        assert!(!a.is_suspicious);
        assert_eq!(a.risk_tier, RiskTier::Low);
    }

    #[test]
    fn test_novel_transaction_fires_rules() {
        let scorer = warmed_up();
        let a = scorer.assess(&tx(900.0, 3, "casino", "Lagos")).unwrap();
        assert!((a.risk_score - 0.9).abs() < 1e-9);
        assert!(a.is_suspicious);
        assert_eq!(a.risk_tier, RiskTier::High);
        assert_eq!(a.reasons.len(), 4);
        assert!(a.reasons[0].starts_with("Amount"));
    }

    #[test]
    fn test_recent_risk_rule() {
        let scorer = warmed_up();
        for i in 0..10 {
            scorer
                .assess(&tx(40.0, i, &format!("shop-{}", i), &format!("city-{}", i)))
                .unwrap();
        }
        let a = scorer.assess(&tx(40.0, 12, "grocery", "Berlin")).unwrap();
        assert_eq!(a.reasons.len(), 1);
        assert!(a.reasons[0].starts_with("Elevated recent risk"));
    }

    #[test]
    fn test_missing_user_id_rejected() {
        let scorer = BehavioralScorer::default();
        let record = Transaction::new().with_field("Amount", 1.0);
        assert!(matches!(scorer.assess(&record), Err(FraudError::InvalidInput(_))));
    }
}

//! Per-user behavioural statistics

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Number of recent risk scores kept per user
pub const RECENT_RISK_CAPACITY: usize = 10;

/// Accumulated history of one user's transactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorProfile {
    pub user_id: String,
    /// Transactions recorded
    pub transaction_count: u64,
    /// Transactions that carried a numeric amount
    amount_count: u64,
    /// Running mean of amounts
    pub average_amount: f64,
    pub merchant_counts: HashMap<String, u32>,
    /// Transactions per hour of day
    pub hourly: [u32; 24],
    pub location_counts: HashMap<String, u32>,
    /// Most recent risk scores, oldest first
    recent_risk: VecDeque<f64>,
}

impl BehaviorProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            transaction_count: 0,
            amount_count: 0,
            average_amount: 0.0,
            merchant_counts: HashMap::new(),
            hourly: [0; 24],
            location_counts: HashMap::new(),
            recent_risk: VecDeque::with_capacity(RECENT_RISK_CAPACITY),
        }
    }

    /// Whether any transaction has been recorded
    pub fn is_new(&self) -> bool {
        self.transaction_count == 0
    }

    /// Whether amounts have been seen, making `average_amount` meaningful
    pub fn has_amount_history(&self) -> bool {
        self.amount_count > 0
    }

    pub fn has_seen_hour(&self, hour: u32) -> bool {
        self.hourly.get(hour as usize).is_some_and(|&c| c > 0)
    }

    pub fn merchant_frequency(&self, merchant: &str) -> u32 {
        self.merchant_counts.get(&key(merchant)).copied().unwrap_or(0)
    }

    pub fn location_frequency(&self, location: &str) -> u32 {
        self.location_counts.get(&key(location)).copied().unwrap_or(0)
    }

    /// Recent risk scores, oldest first
    pub fn recent_risk(&self) -> impl Iterator<Item = f64> + '_ {
        self.recent_risk.iter().copied()
    }

    /// Mean of the recent risk scores, 0 when there are none
    pub fn average_recent_risk(&self) -> f64 {
        if self.recent_risk.is_empty() {
            return 0.0;
        }
        self.recent_risk.iter().sum::<f64>() / self.recent_risk.len() as f64
    }

    /// Fold one transaction into the profile
    pub fn record(
        &mut self,
        amount: Option<f64>,
        hour: Option<u32>,
        merchant: Option<&str>,
        location: Option<&str>,
        risk: f64,
    ) {
        self.transaction_count += 1;

        if let Some(amount) = amount.filter(|a| a.is_finite()) {
            self.amount_count += 1;
            self.average_amount += (amount - self.average_amount) / self.amount_count as f64;
        }
        if let Some(slot) = hour.and_then(|h| self.hourly.get_mut(h as usize)) {
            *slot += 1;
        }
        if let Some(merchant) = merchant {
            *self.merchant_counts.entry(key(merchant)).or_insert(0) += 1;
        }
        if let Some(location) = location {
            *self.location_counts.entry(key(location)).or_insert(0) += 1;
        }

        if self.recent_risk.len() == RECENT_RISK_CAPACITY {
            self.recent_risk.pop_front();
        }
        self.recent_risk.push_back(risk.clamp(0.0, 1.0));
    }
}

fn key(value: &str) -> String {
    value.trim().to_lowercase()
}

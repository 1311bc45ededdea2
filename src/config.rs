//! Engine configuration
//!
//! One JSON document covers training, behavioural rules and the profile
//! store. Missing sections and fields take their defaults.

use crate::behavior::{BehaviorRules, ProfileStoreConfig};
use crate::error::{FraudError, Result};
use crate::training::TrainingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub training: TrainingConfig,
    pub behavior: BehaviorRules,
    pub profiles: ProfileStoreConfig,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_training(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }

    pub fn with_behavior(mut self, behavior: BehaviorRules) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_profiles(mut self, profiles: ProfileStoreConfig) -> Self {
        self.profiles = profiles;
        self
    }

    /// Load and validate a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| FraudError::ConfigError(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        tracing::debug!(path = %path.display(), kind = %config.training.model_kind, "Configuration loaded");
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.training.validate()?;
        self.profiles.validate()?;

        let rules = &self.behavior;
        if !(0.0..=1.0).contains(&rules.threshold) {
            return Err(FraudError::invalid_parameter(
                "behavior.threshold",
                rules.threshold,
                "must be within [0, 1]",
            ));
        }
        if !(rules.amount_multiplier.is_finite() && rules.amount_multiplier > 0.0) {
            return Err(FraudError::invalid_parameter(
                "behavior.amount_multiplier",
                rules.amount_multiplier,
                "must be positive",
            ));
        }
        let weights = [
            ("behavior.amount_weight", rules.amount_weight),
            ("behavior.unusual_hour_weight", rules.unusual_hour_weight),
            ("behavior.new_merchant_weight", rules.new_merchant_weight),
            ("behavior.new_location_weight", rules.new_location_weight),
            ("behavior.recent_risk_weight", rules.recent_risk_weight),
        ];
        if let Some((name, w)) = weights.iter().find(|(_, w)| !(w.is_finite() && *w >= 0.0)) {
            return Err(FraudError::invalid_parameter(*name, w, "must be non-negative"));
        }
        Ok(())
    }
}

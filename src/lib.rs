//! fraud-ensemble - ensemble fraud scoring engine
//!
//! Scores card transactions with a blend of unsupervised anomaly detectors
//! and a supervised, class-weighted decision forest:
//! - Feature extraction from raw transaction records
//! - Isolation forest, local outlier factor and a one-class boundary scorer
//! - Class-weighted decision forest with fraud oversampling
//! - Weighted-blend or single-model score aggregation with explanations
//! - Background training with progress, cancellation and atomic model swap
//!
//! # Modules
//!
//! ## Scoring
//! - [`features`] - Transactions, feature identifiers and extraction
//! - [`anomaly`] - Isolation forest, LOF, one-class scorer
//! - [`training`] - Weighted decision forest, training engine, progress
//! - [`ensemble`] - Score aggregation, risk tiers, explanations
//! - [`inference`] - Trained models, predictions, active model handle
//! - [`evaluation`] - Confusion matrix and held-out metrics
//!
//! ## Services
//! - [`jobs`] - Background training jobs
//! - [`export`] - Model persistence and model stores
//! - [`behavior`] - Rule-based per-user behavioural scoring
//! - [`config`] - Engine configuration files
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;
pub mod config;

// Scoring
pub mod features;
pub mod anomaly;
pub mod training;
pub mod ensemble;
pub mod inference;
pub mod evaluation;

// Services
pub mod jobs;
pub mod export;
pub mod behavior;
pub mod cli;

pub use error::{FraudError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{FraudError, Result};
    pub use crate::config::EngineConfig;

    // Features
    pub use crate::features::{FeatureExtractor, FeatureId, FeatureVector, FieldValue, Transaction};

    // Detectors
    pub use crate::anomaly::{AnomalyDetector, IsolationForest, LocalOutlierFactor, OneClassScorer};

    // Training
    pub use crate::training::{
        DecisionTree, ModelKind, ProgressTracker, TrainEngine, TrainingConfig, TrainingOutcome,
        TrainingStage, WeightedForest,
    };

    // Ensemble
    pub use crate::ensemble::{AggregationPolicy, AnomalyEnsemble, BlendWeights, RiskTier, ScoreAggregator};

    // Inference
    pub use crate::inference::{ActiveModel, FraudModel, Prediction};

    // Evaluation
    pub use crate::evaluation::{ConfusionMatrix, EvaluationReport, Evaluator};

    // Services
    pub use crate::behavior::{BehavioralScorer, ProfileStore, ProfileStoreConfig};
    pub use crate::export::{FileModelStore, MemoryModelStore, ModelMetadata, ModelStore};
    pub use crate::jobs::{JobStatus, TrainingJobs};
}

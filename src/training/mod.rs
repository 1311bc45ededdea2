//! Model training module
//!
//! Provides the supervised fraud classifier and the training round that
//! produces any [`ModelKind`]:
//! - Class-weighted decision trees and the oversampling weighted forest
//! - Dataset validation and train/test splitting
//! - [`TrainEngine`], which turns labeled or unlabeled records into a
//!   [`FraudModel`](crate::inference::FraudModel)
//! - Progress reporting and cooperative cancellation

mod config;
mod dataset;
mod engine;
pub mod decision_tree;
pub mod progress;
pub mod random_forest;

pub use config::{ModelKind, TrainingConfig};
pub use dataset::{train_test_split, validate_dataset};
pub use decision_tree::{weighted_gini, DecisionTree, TreeNode};
pub use engine::{TrainEngine, TrainingOutcome};
pub use progress::{ProgressSnapshot, ProgressTracker, TrainingStage};
pub use random_forest::WeightedForest;

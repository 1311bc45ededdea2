//! Trained models and prediction
//!
//! - [`FraudModel`] - immutable trained model value (extractor statistics + scorer)
//! - [`Prediction`] - per-transaction result with risk score, tier and reasons
//! - [`ActiveModel`] - shared handle to the model currently serving predictions

mod active;
mod model;
mod prediction;

pub use active::ActiveModel;
pub use model::{FraudModel, ModelSummary, TrainedScorer};
pub use prediction::Prediction;

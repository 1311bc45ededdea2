//! Transaction records and feature extraction
//!
//! - [`Transaction`] - raw record as captured upstream
//! - [`FeatureExtractor`] - deterministic record to [`FeatureVector`] mapping
//! - [`FeatureId`] - closed set of model input features

mod extractor;
mod transaction;
mod vector;

pub use extractor::{
    device_risk, location_risk, merchant_risk, time_risk, AmountStatistics, FeatureExtractor,
    DEFAULT_DEVICE_RISK, DEFAULT_MERCHANT_RISK,
};
pub use transaction::{FieldValue, Transaction};
pub use vector::{
    common_features, feature_matrix, select_features, FeatureId, FeatureVector, ANONYMIZED_COUNT,
    DERIVED_COUNT, FEATURE_COUNT,
};

//! Error types for the fraud scoring engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, FraudError>;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum FraudError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Model not trained")]
    ModelNotTrained,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Training cancelled")]
    TrainingCancelled,

    #[error("Training job not found: {0}")]
    JobNotFound(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl FraudError {
    /// Shorthand for an `InvalidParameter` error
    pub fn invalid_parameter(
        name: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        FraudError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for FraudError {
    fn from(err: serde_json::Error) -> Self {
        FraudError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for FraudError {
    fn from(err: bincode::Error) -> Self {
        FraudError::SerializationError(err.to_string())
    }
}

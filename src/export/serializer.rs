//! Model serialization utilities
//!
//! Models are wrapped in an envelope carrying magic bytes, a format version,
//! metadata and an FNV-1a checksum of the encoded model.

use crate::error::{FraudError, Result};
use crate::inference::FraudModel;
use crate::training::ModelKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Serialization format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    /// Binary format using bincode (efficient)
    #[default]
    Binary,
    /// JSON format (portable, human-readable)
    Json,
}

impl SerializationFormat {
    /// Format implied by a file extension; `.json` is JSON, anything else binary
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => SerializationFormat::Json,
            _ => SerializationFormat::Binary,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            SerializationFormat::Binary => "model",
            SerializationFormat::Json => "json",
        }
    }
}

/// Model metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name
    pub name: String,
    /// Model version
    pub version: String,
    pub kind: ModelKind,
    /// Training timestamp
    pub trained_at: DateTime<Utc>,
    /// Feature names
    pub feature_names: Vec<String>,
    pub threshold: f64,
    /// Held-out metrics, when the model was evaluated
    pub metrics: BTreeMap<String, f64>,
    /// Free-form annotations
    pub extra: BTreeMap<String, String>,
}

impl ModelMetadata {
    /// Metadata describing `model`
    pub fn for_model(name: impl Into<String>, model: &FraudModel) -> Self {
        let summary = model.summary();
        let metrics = summary
            .metrics
            .map(|m| {
                BTreeMap::from([
                    ("accuracy".to_string(), m.accuracy),
                    ("precision".to_string(), m.precision),
                    ("recall".to_string(), m.recall),
                    ("f1_score".to_string(), m.f1_score),
                ])
            })
            .unwrap_or_default();
        Self {
            name: name.into(),
            version: "1.0.0".to_string(),
            kind: summary.kind,
            trained_at: summary.trained_at,
            feature_names: summary.features,
            threshold: summary.threshold,
            metrics,
            extra: BTreeMap::new(),
        }
    }

    /// Set version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Add a free-form annotation
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Serialized model envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedModel {
    /// Magic bytes for format detection
    pub magic: [u8; 4],
    /// Envelope format version
    pub format_version: u32,
    /// Encoding of `model_data`
    pub format: SerializationFormat,
    pub metadata: ModelMetadata,
    /// Encoded model
    pub model_data: Vec<u8>,
    /// Checksum for integrity verification
    pub checksum: u64,
}

impl SerializedModel {
    /// Magic bytes of fraud model files
    pub const MAGIC: [u8; 4] = *b"FRDM";
    /// Current envelope version
    pub const VERSION: u32 = 1;

    /// Encode a model into an envelope
    pub fn encode(model: &FraudModel, metadata: ModelMetadata, format: SerializationFormat) -> Result<Self> {
        let model_data = match format {
            SerializationFormat::Binary => bincode::serialize(model)?,
            SerializationFormat::Json => serde_json::to_vec(model)?,
        };
        let checksum = compute_checksum(&model_data);
        Ok(Self {
            magic: Self::MAGIC,
            format_version: Self::VERSION,
            format,
            metadata,
            model_data,
            checksum,
        })
    }

    /// Verify checksum
    pub fn verify_checksum(&self) -> bool {
        compute_checksum(&self.model_data) == self.checksum
    }

    /// Decode the model after checking magic, version and checksum
    pub fn decode(&self) -> Result<FraudModel> {
        if self.magic != Self::MAGIC {
            return Err(FraudError::SerializationError(
                "not a fraud model file".to_string(),
            ));
        }
        if self.format_version > Self::VERSION {
            return Err(FraudError::SerializationError(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }
        if !self.verify_checksum() {
            return Err(FraudError::SerializationError(
                "Checksum verification failed - data may be corrupted".to_string(),
            ));
        }
        let model = match self.format {
            SerializationFormat::Binary => bincode::deserialize(&self.model_data)?,
            SerializationFormat::Json => serde_json::from_slice(&self.model_data)?,
        };
        Ok(model)
    }

    /// Envelope as bytes in its own format
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self.format {
            SerializationFormat::Binary => Ok(bincode::serialize(self)?),
            SerializationFormat::Json => Ok(serde_json::to_vec_pretty(self)?),
        }
    }

    /// Parse an envelope written by [`SerializedModel::to_bytes`]
    pub fn from_bytes(bytes: &[u8], format: SerializationFormat) -> Result<Self> {
        match format {
            SerializationFormat::Binary => Ok(bincode::deserialize(bytes)?),
            SerializationFormat::Json => Ok(serde_json::from_slice(bytes)?),
        }
    }
}

/// FNV-1a hash
fn compute_checksum(data: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 14695981039346656037;
    const FNV_PRIME: u64 = 1099511628211;

    let mut hash = FNV_OFFSET;
    for byte in data {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Save a model to a file; the format follows the file extension
pub fn save_model(model: &FraudModel, metadata: ModelMetadata, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let envelope = SerializedModel::encode(model, metadata, SerializationFormat::from_path(path))?;
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&envelope.to_bytes()?)?;
    writer.flush()?;
    tracing::info!(path = %path.display(), kind = %model.kind(), "Model saved");
    Ok(())
}

/// Load a model and its metadata from a file written by [`save_model`]
pub fn load_model(path: impl AsRef<Path>) -> Result<(FraudModel, ModelMetadata)> {
    let path = path.as_ref();
    let mut bytes = Vec::new();
    BufReader::new(File::open(path)?).read_to_end(&mut bytes)?;
    let envelope = SerializedModel::from_bytes(&bytes, SerializationFormat::from_path(path))?;
    let model = envelope.decode()?;
    Ok((model, envelope.metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::{AnomalyDetector, IsolationForest};
    use crate::features::{FeatureExtractor, FeatureId, FeatureVector};
    use crate::inference::TrainedScorer;

    fn model() -> FraudModel {
        let data: Vec<FeatureVector> = (0..40)
            .map(|i| FeatureVector::from_pairs([(FeatureId::Amount, (i * 7 % 13) as f64)]))
            .collect();
        let mut forest = IsolationForest::new().with_n_estimators(8).with_seed(5);
        forest.fit(&data).unwrap();
        FraudModel::new(FeatureExtractor::new(), TrainedScorer::IsolationForest(forest), 0.6)
    }

    #[test]
    fn test_checksum_is_fnv1a() {
        assert_eq!(compute_checksum(b""), 14695981039346656037);
        assert_eq!(compute_checksum(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn test_envelope_round_trip_both_formats() {
        let model = model();
        for format in [SerializationFormat::Binary, SerializationFormat::Json] {
            let envelope = SerializedModel::encode(&model, ModelMetadata::for_model("m", &model), format).unwrap();
            let bytes = envelope.to_bytes().unwrap();
            let back = SerializedModel::from_bytes(&bytes, format).unwrap();
            assert_eq!(back.decode().unwrap(), model);
            assert_eq!(back.metadata.kind, ModelKind::IsolationForest);
        }
    }

    #[test]
    fn test_corruption_detected() {
        let model = model();
        let mut envelope =
            SerializedModel::encode(&model, ModelMetadata::for_model("m", &model), SerializationFormat::Binary).unwrap();
        envelope.model_data[0] ^= 0xff;
        assert!(matches!(envelope.decode(), Err(FraudError::SerializationError(_))));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(SerializationFormat::from_path(Path::new("a/model.JSON")), SerializationFormat::Json);
        assert_eq!(SerializationFormat::from_path(Path::new("a/model.bin")), SerializationFormat::Binary);
    }
}

//! Model stores: `save(model, metadata) -> id`, `load(id) -> model`

use super::serializer::{ModelMetadata, SerializationFormat, SerializedModel};
use crate::error::{FraudError, Result};
use crate::inference::FraudModel;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Storage contract for trained models
pub trait ModelStore: Send + Sync {
    /// Persist a model and return its id
    fn save(&self, model: &FraudModel, metadata: ModelMetadata) -> Result<String>;

    /// Load a model by id
    fn load(&self, model_id: &str) -> Result<FraudModel>;

    /// Metadata of a stored model
    fn metadata(&self, model_id: &str) -> Result<ModelMetadata>;

    /// Ids and metadata of every stored model, oldest first
    fn list(&self) -> Result<Vec<(String, ModelMetadata)>>;

    /// Remove a stored model
    fn delete(&self, model_id: &str) -> Result<()>;
}

fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// In-process store keeping encoded envelopes
#[derive(Debug, Default)]
pub struct MemoryModelStore {
    format: SerializationFormat,
    models: RwLock<HashMap<String, SerializedModel>>,
}

impl MemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(mut self, format: SerializationFormat) -> Self {
        self.format = format;
        self
    }

    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }
}

impl ModelStore for MemoryModelStore {
    fn save(&self, model: &FraudModel, metadata: ModelMetadata) -> Result<String> {
        let envelope = SerializedModel::encode(model, metadata, self.format)?;
        let id = generate_id();
        self.models.write().insert(id.clone(), envelope);
        tracing::debug!(model_id = %id, "Model stored in memory");
        Ok(id)
    }

    fn load(&self, model_id: &str) -> Result<FraudModel> {
        self.models
            .read()
            .get(model_id)
            .ok_or_else(|| FraudError::ModelNotFound(model_id.to_string()))?
            .decode()
    }

    fn metadata(&self, model_id: &str) -> Result<ModelMetadata> {
        self.models
            .read()
            .get(model_id)
            .map(|e| e.metadata.clone())
            .ok_or_else(|| FraudError::ModelNotFound(model_id.to_string()))
    }

    fn list(&self) -> Result<Vec<(String, ModelMetadata)>> {
        let mut entries: Vec<(String, ModelMetadata)> = self
            .models
            .read()
            .iter()
            .map(|(id, e)| (id.clone(), e.metadata.clone()))
            .collect();
        entries.sort_by(|a, b| a.1.trained_at.cmp(&b.1.trained_at).then_with(|| a.0.cmp(&b.0)));
        Ok(entries)
    }

    fn delete(&self, model_id: &str) -> Result<()> {
        self.models
            .write()
            .remove(model_id)
            .map(|_| ())
            .ok_or_else(|| FraudError::ModelNotFound(model_id.to_string()))
    }
}

/// Directory-backed store, one file per model named `<id>.<ext>`
#[derive(Debug, Clone)]
pub struct FileModelStore {
    root: PathBuf,
    format: SerializationFormat,
}

impl FileModelStore {
    /// Open (and create if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            format: SerializationFormat::default(),
        })
    }

    pub fn with_format(mut self, format: SerializationFormat) -> Self {
        self.format = format;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_valid_id(model_id: &str) -> bool {
        !model_id.is_empty() && model_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    /// Path of a stored model, whichever format it was written in
    fn find(&self, model_id: &str) -> Result<(PathBuf, SerializationFormat)> {
        if !Self::is_valid_id(model_id) {
            return Err(FraudError::ModelNotFound(model_id.to_string()));
        }
        [SerializationFormat::Binary, SerializationFormat::Json]
            .into_iter()
            .map(|f| (self.root.join(format!("{}.{}", model_id, f.extension())), f))
            .find(|(path, _)| path.is_file())
            .ok_or_else(|| FraudError::ModelNotFound(model_id.to_string()))
    }

    fn read_envelope(&self, model_id: &str) -> Result<SerializedModel> {
        let (path, format) = self.find(model_id)?;
        let bytes = fs::read(&path)?;
        SerializedModel::from_bytes(&bytes, format)
    }
}

/// Write through `<path>.tmp` and rename, so readers never observe a partial
/// file. The temp file is removed if either step fails.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let result = fs::write(&tmp, bytes).and_then(|_| fs::rename(&tmp, path));
    if let Err(e) = result {
        if let Err(cleanup) = fs::remove_file(&tmp) {
            if cleanup.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %tmp.display(), error = %cleanup, "Failed to remove temp file");
            }
        }
        return Err(e.into());
    }
    Ok(())
}

impl ModelStore for FileModelStore {
    fn save(&self, model: &FraudModel, metadata: ModelMetadata) -> Result<String> {
        let envelope = SerializedModel::encode(model, metadata, self.format)?;
        let id = generate_id();
        let path = self.root.join(format!("{}.{}", id, self.format.extension()));

        write_atomic(&path, &envelope.to_bytes()?)?;

        tracing::info!(model_id = %id, path = %path.display(), "Model saved");
        Ok(id)
    }

    fn load(&self, model_id: &str) -> Result<FraudModel> {
        self.read_envelope(model_id)?.decode()
    }

    fn metadata(&self, model_id: &str) -> Result<ModelMetadata> {
        Ok(self.read_envelope(model_id)?.metadata)
    }

    fn list(&self) -> Result<Vec<(String, ModelMetadata)>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            let is_model = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("model") | Some("json")
            );
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !is_model {
                continue;
            }
            match self.metadata(id) {
                Ok(metadata) => entries.push((id.to_string(), metadata)),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable model file"),
            }
        }
        entries.sort_by(|a, b| a.1.trained_at.cmp(&b.1.trained_at).then_with(|| a.0.cmp(&b.0)));
        Ok(entries)
    }

    fn delete(&self, model_id: &str) -> Result<()> {
        let (path, _) = self.find(model_id)?;
        fs::remove_file(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::{AnomalyDetector, OneClassScorer};
    use crate::features::{FeatureExtractor, FeatureId, FeatureVector};
    use crate::inference::TrainedScorer;

    fn model() -> FraudModel {
        let data: Vec<FeatureVector> = (0..30)
            .map(|i| FeatureVector::from_pairs([(FeatureId::Velocity, (i % 5) as f64)]))
            .collect();
        let mut scorer = OneClassScorer::new();
        scorer.fit(&data).unwrap();
        FraudModel::new(FeatureExtractor::new(), TrainedScorer::OneClass(scorer), 0.5)
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryModelStore::new();
        let model = model();
        let id = store.save(&model, ModelMetadata::for_model("oc", &model)).unwrap();

        assert_eq!(store.load(&id).unwrap(), model);
        assert_eq!(store.metadata(&id).unwrap().name, "oc");
        assert_eq!(store.list().unwrap().len(), 1);

        store.delete(&id).unwrap();
        assert!(store.is_empty());
        assert!(matches!(store.load(&id), Err(FraudError::ModelNotFound(_))));
    }

    #[test]
    fn test_failed_write_leaves_no_temp_file() {
        let dir = tempfile::TempDir::new().unwrap();
        // A non-empty directory at the target makes the rename fail
        let target = dir.path().join("blocked.model");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), b"x").unwrap();

        assert!(matches!(write_atomic(&target, b"data"), Err(FraudError::IoError(_))));
        assert!(!dir.path().join("blocked.tmp").exists());
        assert!(target.join("keep").exists());

        let ok = dir.path().join("fine.model");
        write_atomic(&ok, b"data").unwrap();
        assert_eq!(fs::read(&ok).unwrap(), b"data");
        assert!(!dir.path().join("fine.tmp").exists());
    }

    #[test]
    fn test_unknown_id() {
        let store = MemoryModelStore::new().with_format(SerializationFormat::Json);
        assert!(matches!(store.metadata("nope"), Err(FraudError::ModelNotFound(_))));
    }
}

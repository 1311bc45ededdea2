//! Atomically swappable handle to the serving model

use super::model::FraudModel;
use super::prediction::Prediction;
use crate::error::{FraudError, Result};
use crate::features::Transaction;
use parking_lot::RwLock;
use std::sync::Arc;

/// Shared handle to the model currently serving predictions.
///
/// Cloning the handle shares the slot. A swap replaces the whole model
/// pointer under a write lock, so a reader sees either the old or the new
/// model and never a mix; predictions run on a cloned `Arc` outside the lock.
#[derive(Debug, Clone, Default)]
pub struct ActiveModel {
    slot: Arc<RwLock<Option<Arc<FraudModel>>>>,
}

impl ActiveModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle already serving `model`
    pub fn with_model(model: FraudModel) -> Self {
        let active = Self::new();
        active.swap(model);
        active
    }

    /// Install a new model, returning the one it replaced
    pub fn swap(&self, model: FraudModel) -> Option<Arc<FraudModel>> {
        self.swap_arc(Arc::new(model))
    }

    pub fn swap_arc(&self, model: Arc<FraudModel>) -> Option<Arc<FraudModel>> {
        let kind = model.kind();
        let previous = self.slot.write().replace(model);
        tracing::info!(kind = %kind, replaced = previous.is_some(), "Active model swapped");
        previous
    }

    /// Remove the serving model
    pub fn clear(&self) -> Option<Arc<FraudModel>> {
        self.slot.write().take()
    }

    /// Snapshot of the serving model
    pub fn current(&self) -> Option<Arc<FraudModel>> {
        self.slot.read().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.slot.read().is_some()
    }

    /// Predict with the serving model; `ModelNotTrained` when there is none
    pub fn predict(&self, tx: &Transaction) -> Result<Prediction> {
        let model = self.current().ok_or(FraudError::ModelNotTrained)?;
        model.predict(tx)
    }
}

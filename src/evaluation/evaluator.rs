//! Held-out evaluation of a trained model

use super::metrics::{ConfusionMatrix, EvaluationReport};
use crate::error::{FraudError, Result};
use crate::features::Transaction;
use crate::inference::FraudModel;
use rayon::prelude::*;

/// Scores labeled records with a model and tallies the outcomes
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator;

impl Evaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `model` on labeled `records`.
    ///
    /// Every record must carry a `Class` label; an unlabeled or malformed
    /// record is an `InvalidInput` error.
    pub fn evaluate(&self, model: &FraudModel, records: &[Transaction]) -> Result<EvaluationReport> {
        if records.is_empty() {
            return Err(FraudError::InvalidInput(
                "cannot evaluate on an empty dataset".to_string(),
            ));
        }

        let outcomes: Vec<(bool, bool)> = records
            .par_iter()
            .enumerate()
            .map(|(i, tx)| {
                let actual = tx.label()?.ok_or_else(|| {
                    FraudError::InvalidInput(format!("record {} has no Class label", i))
                })?;
                let predicted = model.predict(tx)?.is_fraud;
                Ok((predicted, actual))
            })
            .collect::<Result<_>>()?;

        let mut confusion = ConfusionMatrix::new();
        for (predicted, actual) in outcomes {
            confusion.record(predicted, actual);
        }

        let report = EvaluationReport::from(confusion);
        tracing::info!(
            samples = report.n_samples,
            accuracy = report.accuracy,
            precision = report.precision,
            recall = report.recall,
            f1 = report.f1_score,
            "Model evaluated"
        );
        Ok(report)
    }
}

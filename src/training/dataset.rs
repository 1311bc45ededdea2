//! Dataset validation and train/test splitting

use crate::error::{FraudError, Result};
use crate::features::Transaction;
use rand::seq::SliceRandom;
use rand::Rng;

/// Check a training dataset and parse its labels.
///
/// Every record needs a numeric amount. With `require_labels`, every record
/// also needs a `Class` label of 0 or 1.
pub fn validate_dataset(records: &[Transaction], require_labels: bool) -> Result<Vec<Option<bool>>> {
    if records.is_empty() {
        return Err(FraudError::InvalidInput("dataset is empty".to_string()));
    }

    records
        .iter()
        .enumerate()
        .map(|(i, tx)| {
            if !tx.has_amount_field() {
                return Err(FraudError::InvalidInput(format!(
                    "record {} is missing the Amount field",
                    i
                )));
            }
            if tx.amount().is_none() {
                return Err(FraudError::InvalidInput(format!(
                    "record {} has a non-numeric Amount",
                    i
                )));
            }
            let label = tx
                .label()
                .map_err(|e| FraudError::InvalidInput(format!("record {}: {}", i, e)))?;
            if require_labels && label.is_none() {
                return Err(FraudError::InvalidInput(format!(
                    "record {} is missing the Class field required for supervised training",
                    i
                )));
            }
            Ok(label)
        })
        .collect()
}

/// Shuffled train/test index split.
///
/// The test side gets `floor(n * test_fraction)` records, capped so that at
/// least one record remains for training.
pub fn train_test_split<R: Rng>(n: usize, test_fraction: f64, rng: &mut R) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    let test_size = ((n as f64 * test_fraction) as usize).min(n.saturating_sub(1));
    let test = indices.split_off(n - test_size);
    (indices, test)
}

//! Confusion matrix and derived classification metrics

use crate::error::{FraudError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Counts of the four prediction outcomes, fraud being the positive class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from paired predictions and ground truth
    pub fn from_predictions(predicted: &[bool], actual: &[bool]) -> Result<Self> {
        if predicted.len() != actual.len() {
            return Err(FraudError::InvalidInput(format!(
                "{} predictions but {} labels",
                predicted.len(),
                actual.len()
            )));
        }
        let mut matrix = Self::new();
        for (p, a) in predicted.iter().zip(actual) {
            matrix.record(*p, *a);
        }
        Ok(matrix)
    }

    /// Count one outcome
    pub fn record(&mut self, predicted: bool, actual: bool) {
        match (actual, predicted) {
            (true, true) => self.true_positives += 1,
            (false, true) => self.false_positives += 1,
            (false, false) => self.true_negatives += 1,
            (true, false) => self.false_negatives += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    /// `TP / (TP + FP)`, 0 when nothing was predicted positive
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    /// `TP / (TP + FN)`, 0 when there are no positives
    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1_score(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r > 0.0 {
            2.0 * p * r / (p + r)
        } else {
            0.0
        }
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Evaluation outcome of a model on a held-out set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub confusion: ConfusionMatrix,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub n_samples: usize,
}

impl From<ConfusionMatrix> for EvaluationReport {
    fn from(confusion: ConfusionMatrix) -> Self {
        Self {
            accuracy: confusion.accuracy(),
            precision: confusion.precision(),
            recall: confusion.recall(),
            f1_score: confusion.f1_score(),
            n_samples: confusion.total(),
            confusion,
        }
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.confusion;
        writeln!(f, "samples:   {}", self.n_samples)?;
        writeln!(f, "accuracy:  {:.4}", self.accuracy)?;
        writeln!(f, "precision: {:.4}", self.precision)?;
        writeln!(f, "recall:    {:.4}", self.recall)?;
        writeln!(f, "f1:        {:.4}", self.f1_score)?;
        write!(
            f,
            "confusion: tp={} fp={} tn={} fn={}",
            c.true_positives, c.false_positives, c.true_negatives, c.false_negatives
        )
    }
}

//! Training progress reporting and cooperative cancellation

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Stage of a training run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainingStage {
    Pending,
    Preparing,
    ExtractingFeatures,
    TrainingModel,
    Evaluating,
    Completed,
}

impl TrainingStage {
    /// Overall percent range covered by this stage
    fn range(&self) -> (f64, f64) {
        match self {
            TrainingStage::Pending => (0.0, 0.0),
            TrainingStage::Preparing => (0.0, 5.0),
            TrainingStage::ExtractingFeatures => (5.0, 15.0),
            TrainingStage::TrainingModel => (15.0, 90.0),
            TrainingStage::Evaluating => (90.0, 100.0),
            TrainingStage::Completed => (100.0, 100.0),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TrainingStage::Pending => "pending",
            TrainingStage::Preparing => "preparing",
            TrainingStage::ExtractingFeatures => "extracting_features",
            TrainingStage::TrainingModel => "training_model",
            TrainingStage::Evaluating => "evaluating",
            TrainingStage::Completed => "completed",
        }
    }
}

/// Point-in-time view of a training run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub stage: TrainingStage,
    /// Overall completion in `[0, 100]`
    pub percent: f64,
}

/// Shared progress state for one training run.
///
/// Written by the training thread, polled by anyone holding a reference.
/// Cancellation is cooperative: forests check [`ProgressTracker::is_cancelled`]
/// between whole-tree builds.
#[derive(Debug)]
pub struct ProgressTracker {
    stage: RwLock<TrainingStage>,
    completed: AtomicUsize,
    total: AtomicUsize,
    cancelled: AtomicBool,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            stage: RwLock::new(TrainingStage::Pending),
            completed: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Enter a new stage made of `total_units` steps
    pub fn set_stage(&self, stage: TrainingStage, total_units: usize) {
        let mut current = self.stage.write();
        self.completed.store(0, Ordering::SeqCst);
        self.total.store(total_units, Ordering::SeqCst);
        *current = stage;
        drop(current);
        tracing::debug!(stage = stage.name(), units = total_units, "Training stage started");
    }

    /// Mark one unit of the current stage complete
    pub fn advance(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn stage(&self) -> TrainingStage {
        *self.stage.read()
    }

    /// Overall percent complete
    pub fn percent(&self) -> f64 {
        self.snapshot().percent
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        // set_stage resets the counters while holding the write lock
        let stage = self.stage.read();
        let (start, end) = stage.range();
        let total = self.total.load(Ordering::SeqCst);
        let completed = self.completed.load(Ordering::SeqCst).min(total);
        let fraction = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64
        };
        ProgressSnapshot {
            stage: *stage,
            percent: start + (end - start) * fraction,
        }
    }
}

/// Whether an optional tracker has been cancelled
pub(crate) fn cancelled(progress: Option<&ProgressTracker>) -> bool {
    progress.map_or(false, ProgressTracker::is_cancelled)
}

/// Advance an optional tracker
pub(crate) fn advance(progress: Option<&ProgressTracker>) {
    if let Some(p) = progress {
        p.advance();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_within_stage_range() {
        let tracker = ProgressTracker::new();
        assert_eq!(tracker.percent(), 0.0);

        tracker.set_stage(TrainingStage::TrainingModel, 4);
        assert_eq!(tracker.percent(), 15.0);
        tracker.advance();
        tracker.advance();
        assert!((tracker.percent() - 52.5).abs() < 1e-9);

        tracker.set_stage(TrainingStage::Completed, 0);
        assert_eq!(tracker.percent(), 100.0);
    }

    #[test]
    fn test_completed_never_exceeds_total() {
        let tracker = ProgressTracker::new();
        tracker.set_stage(TrainingStage::Evaluating, 1);
        tracker.advance();
        tracker.advance();
        assert_eq!(tracker.percent(), 100.0);
    }

    #[test]
    fn test_cancel_flag() {
        let tracker = ProgressTracker::new();
        assert!(!cancelled(Some(&tracker)));
        tracker.cancel();
        assert!(cancelled(Some(&tracker)));
        assert!(!cancelled(None));
    }
}

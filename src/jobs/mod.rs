//! Background training jobs
//!
//! Training runs on tokio's blocking pool so that request handling never
//! waits on it. Callers poll [`TrainingJobs::status`] for the stage and
//! percent complete, may cancel a running job, and on success the new model
//! is swapped into the shared [`ActiveModel`]. A failed or cancelled job
//! leaves the serving model untouched.

use crate::error::{FraudError, Result};
use crate::evaluation::EvaluationReport;
use crate::export::{ModelMetadata, ModelStore};
use crate::features::Transaction;
use crate::inference::{ActiveModel, ModelSummary};
use crate::training::{ModelKind, ProgressTracker, TrainEngine, TrainingConfig, TrainingStage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use uuid::Uuid;

/// Training job status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running { stage: TrainingStage, percent: f64 },
    Completed {
        metrics: Option<EvaluationReport>,
        summary: ModelSummary,
        /// Id in the attached model store, if any
        model_id: Option<String>,
    },
    Failed { error: String },
    Cancelled,
}

impl JobStatus {
    /// Whether the job has stopped for good
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed { .. } | JobStatus::Failed { .. } | JobStatus::Cancelled
        )
    }
}

/// Training job information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: String,
    pub kind: ModelKind,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

struct JobEntry {
    kind: ModelKind,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    /// Terminal status, once reached
    outcome: Option<JobStatus>,
    tracker: Arc<ProgressTracker>,
    finished: watch::Receiver<bool>,
}

impl JobEntry {
    fn status(&self) -> JobStatus {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let snapshot = self.tracker.snapshot();
        match snapshot.stage {
            TrainingStage::Pending => JobStatus::Pending,
            stage => JobStatus::Running {
                stage,
                percent: snapshot.percent,
            },
        }
    }

    fn info(&self, id: &str) -> JobInfo {
        JobInfo {
            id: id.to_string(),
            kind: self.kind,
            status: self.status(),
            created_at: self.created_at,
            finished_at: self.finished_at,
        }
    }
}

/// Manager of background training jobs
#[derive(Clone)]
pub struct TrainingJobs {
    jobs: Arc<RwLock<HashMap<String, JobEntry>>>,
    active: ActiveModel,
    store: Option<Arc<dyn ModelStore>>,
}

impl TrainingJobs {
    /// Jobs that publish their models into `active`
    pub fn new(active: ActiveModel) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            active,
            store: None,
        }
    }

    /// Also persist every successfully trained model into `store`
    pub fn with_store(mut self, store: Arc<dyn ModelStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn active(&self) -> &ActiveModel {
        &self.active
    }

    /// Start a training job and return its id.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn submit(&self, config: TrainingConfig, dataset: Vec<Transaction>) -> String {
        let id = Uuid::new_v4().simple().to_string();
        let tracker = Arc::new(ProgressTracker::new());
        let (finished_tx, finished_rx) = watch::channel(false);

        self.jobs.write().await.insert(
            id.clone(),
            JobEntry {
                kind: config.model_kind,
                created_at: Utc::now(),
                finished_at: None,
                outcome: None,
                tracker: Arc::clone(&tracker),
                finished: finished_rx,
            },
        );
        tracing::info!(job_id = %id, kind = %config.model_kind, records = dataset.len(), "Training job submitted");

        let jobs = self.clone();
        let job_id = id.clone();
        tokio::spawn(async move {
            let engine = TrainEngine::new(config);
            let store = jobs.store.clone();
            let run_tracker = Arc::clone(&tracker);
            let blocking_id = job_id.clone();
            let result = tokio::task::spawn_blocking(move || {
                let outcome = engine.train_with_progress(&dataset, Some(&run_tracker))?;
                if run_tracker.is_cancelled() {
                    return Err(FraudError::TrainingCancelled);
                }
                let model_id = match &store {
                    Some(store) => {
                        let name = format!("{}-{}", outcome.model.kind(), blocking_id);
                        let metadata = ModelMetadata::for_model(name, &outcome.model)
                            .with_extra("job_id", blocking_id.as_str());
                        Some(store.save(&outcome.model, metadata)?)
                    }
                    None => None,
                };
                Ok((outcome, model_id))
            })
            .await;

            // Swap and outcome are published under the write lock; `cancel`
            // reads the outcome under the read lock
            let mut entries = jobs.jobs.write().await;
            let status = match result {
                Ok(Ok(_)) if tracker.is_cancelled() => {
                    tracing::info!(job_id = %job_id, "Training job cancelled after training");
                    JobStatus::Cancelled
                }
                Ok(Ok((outcome, model_id))) => {
                    let summary = outcome.model.summary();
                    jobs.active.swap(outcome.model);
                    tracing::info!(job_id = %job_id, "Training job completed");
                    JobStatus::Completed {
                        metrics: outcome.metrics,
                        summary,
                        model_id,
                    }
                }
                Ok(Err(FraudError::TrainingCancelled)) => {
                    tracing::info!(job_id = %job_id, "Training job cancelled");
                    JobStatus::Cancelled
                }
                Ok(Err(e)) => {
                    tracing::error!(job_id = %job_id, error = %e, "Training job failed");
                    JobStatus::Failed { error: e.to_string() }
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Training task aborted");
                    JobStatus::Failed {
                        error: format!("training task aborted: {}", e),
                    }
                }
            };

            if let Some(entry) = entries.get_mut(&job_id) {
                entry.outcome = Some(status);
                entry.finished_at = Some(Utc::now());
            }
            drop(entries);
            let _ = finished_tx.send(true);
        });

        id
    }

    /// Current status of a job
    pub async fn status(&self, job_id: &str) -> Result<JobStatus> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .map(JobEntry::status)
            .ok_or_else(|| FraudError::JobNotFound(job_id.to_string()))
    }

    /// Full information about a job
    pub async fn info(&self, job_id: &str) -> Result<JobInfo> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .map(|e| e.info(job_id))
            .ok_or_else(|| FraudError::JobNotFound(job_id.to_string()))
    }

    /// Request cancellation. Returns `false` if the job already finished.
    ///
    /// A running forest stops at the next tree boundary.
    pub async fn cancel(&self, job_id: &str) -> Result<bool> {
        let jobs = self.jobs.read().await;
        let entry = jobs
            .get(job_id)
            .ok_or_else(|| FraudError::JobNotFound(job_id.to_string()))?;
        if entry.outcome.is_some() {
            return Ok(false);
        }
        entry.tracker.cancel();
        tracing::info!(job_id, "Training job cancellation requested");
        Ok(true)
    }

    /// Wait until a job reaches a terminal status
    pub async fn wait(&self, job_id: &str) -> Result<JobStatus> {
        let mut finished = self
            .jobs
            .read()
            .await
            .get(job_id)
            .map(|e| e.finished.clone())
            .ok_or_else(|| FraudError::JobNotFound(job_id.to_string()))?;
        // The sender only drops after publishing, so an error still means done
        let _ = finished.wait_for(|done| *done).await;
        self.status(job_id).await
    }

    /// Forget a finished job. Returns `false` and keeps the entry while the
    /// job is still pending or running.
    pub async fn remove(&self, job_id: &str) -> Result<bool> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs
            .get(job_id)
            .ok_or_else(|| FraudError::JobNotFound(job_id.to_string()))?;
        if entry.outcome.is_none() {
            return Ok(false);
        }
        jobs.remove(job_id);
        Ok(true)
    }

    /// Drop finished jobs that finished at least `older_than` ago.
    /// Returns the number removed.
    pub async fn prune_finished(&self, older_than: Duration) -> usize {
        let now = Utc::now();
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, entry| match (&entry.outcome, entry.finished_at) {
            (Some(_), Some(at)) => now
                .signed_duration_since(at)
                .to_std()
                .map_or(true, |age| age < older_than),
            _ => true,
        });
        let removed = before - jobs.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = jobs.len(), "Pruned finished training jobs");
        }
        removed
    }

    /// All jobs, oldest first
    pub async fn list(&self) -> Vec<JobInfo> {
        let mut jobs: Vec<JobInfo> = self
            .jobs
            .read()
            .await
            .iter()
            .map(|(id, e)| e.info(id))
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }
}

impl std::fmt::Debug for TrainingJobs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingJobs")
            .field("active", &self.active)
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Vec<Transaction> {
        (0..60)
            .map(|i| {
                Transaction::new()
                    .with_field("Amount", if i % 10 == 0 { 5000.0 + i as f64 } else { 30.0 + i as f64 })
                    .with_field("Class", (i % 10 == 0) as i32)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_job_completes_and_swaps_model() {
        let jobs = TrainingJobs::new(ActiveModel::new());
        let config = TrainingConfig::new(ModelKind::WeightedForest)
            .with_num_trees(5)
            .with_seed(1);
        let id = jobs.submit(config, dataset()).await;

        let status = jobs.wait(&id).await.unwrap();
        assert!(matches!(status, JobStatus::Completed { .. }));
        assert!(jobs.active().is_ready());
        assert!(!jobs.cancel(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_job_keeps_previous_model() {
        let jobs = TrainingJobs::new(ActiveModel::new());
        let unlabeled: Vec<Transaction> = (0..10)
            .map(|i| Transaction::new().with_field("Amount", i as f64))
            .collect();
        let id = jobs
            .submit(TrainingConfig::new(ModelKind::WeightedForest), unlabeled)
            .await;

        assert!(matches!(jobs.wait(&id).await.unwrap(), JobStatus::Failed { .. }));
        assert!(!jobs.active().is_ready());
    }

    #[tokio::test]
    async fn test_finished_jobs_can_be_removed_and_pruned() {
        let jobs = TrainingJobs::new(ActiveModel::new());
        let config = TrainingConfig::new(ModelKind::Lof).with_seed(3);
        let first = jobs.submit(config.clone(), dataset()).await;
        let second = jobs.submit(config.clone(), dataset()).await;
        let third = jobs.submit(config, dataset()).await;
        for id in [&first, &second, &third] {
            assert!(jobs.wait(id).await.unwrap().is_terminal());
        }

        assert!(jobs.remove(&first).await.unwrap());
        assert!(matches!(jobs.status(&first).await, Err(FraudError::JobNotFound(_))));

        assert_eq!(jobs.prune_finished(Duration::from_secs(3600)).await, 0);
        assert_eq!(jobs.list().await.len(), 2);
        assert_eq!(jobs.prune_finished(Duration::ZERO).await, 2);
        assert!(jobs.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_unfinished_job_is_not_removed() {
        // Single-threaded runtime: the spawned job cannot start before the next yield
        let jobs = TrainingJobs::new(ActiveModel::new());
        let id = jobs
            .submit(TrainingConfig::new(ModelKind::Lof).with_seed(1), dataset())
            .await;

        assert!(!jobs.remove(&id).await.unwrap());
        assert_eq!(jobs.prune_finished(Duration::ZERO).await, 0);
        assert!(jobs.status(&id).await.is_ok());

        assert!(jobs.wait(&id).await.unwrap().is_terminal());
        assert!(jobs.remove(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let jobs = TrainingJobs::new(ActiveModel::new());
        assert!(matches!(jobs.status("missing").await, Err(FraudError::JobNotFound(_))));
        assert!(matches!(jobs.cancel("missing").await, Err(FraudError::JobNotFound(_))));
    }
}

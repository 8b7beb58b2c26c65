//! Contract with the surrounding application's job queue.
//!
//! The reconciliation core only enqueues work: a retry of a failed training
//! job, or the evaluation jobs that follow a deployment. Durable delivery is
//! the queue owner's concern.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;
use uuid::Uuid;

/// A job handed off to the surrounding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueuedJob {
    /// Re-submit the training job for a fine-tune whose previous attempt
    /// failed. Picked up asynchronously; the fine-tune stays in Training.
    TrainingRetry { fine_tune_id: Uuid },
    /// Run the dataset's evaluation suite against a freshly deployed model.
    EvalJobs {
        dataset_id: Uuid,
        fine_tune_id: Uuid,
    },
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue_training_retry(&self, fine_tune_id: Uuid) -> Result<()>;

    async fn enqueue_eval_jobs(&self, dataset_id: Uuid, fine_tune_id: Uuid) -> Result<()>;
}

/// Queue that collects jobs in memory. Used by tests and by the worker when
/// no external queue is wired in.
#[derive(Debug, Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<Vec<QueuedJob>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every queued job, leaving the queue empty.
    pub fn drain(&self) -> Vec<QueuedJob> {
        let mut jobs = self.jobs.lock().expect("job queue lock poisoned");
        std::mem::take(&mut *jobs)
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue_training_retry(&self, fine_tune_id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.lock().expect("job queue lock poisoned");
        jobs.push(QueuedJob::TrainingRetry { fine_tune_id });
        Ok(())
    }

    async fn enqueue_eval_jobs(&self, dataset_id: Uuid, fine_tune_id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.lock().expect("job queue lock poisoned");
        jobs.push(QueuedJob::EvalJobs {
            dataset_id,
            fine_tune_id,
        });
        Ok(())
    }
}

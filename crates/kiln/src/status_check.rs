//! Periodic reconciliation of in-flight fine-tunes against the trainer.
//!
//! One poll cycle lists every Training fine-tune for a provider, asks the
//! trainer where each job stands, and applies the resulting transition. Each
//! fine-tune is handled concurrently behind its own error boundary, so one
//! bad record never stalls the rest of the fleet.

use crate::analytics::AnalyticsSink;
use crate::fine_tune::{FineTune, FineTuneStatus};
use crate::queue::JobQueue;
use crate::store::FineTuneStore;
use crate::trainer::{TrainerClient, TrainerError, TrainingJobStatus};
use crate::transition::{plan, CheckPolicy, Effect, TrainerSignal};
use crate::usage::UsageLog;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CheckError {
    /// A Training row without an external job handle is a programming
    /// error upstream; the cycle stops before touching the store.
    #[error("fine-tune {0} is TRAINING but has no training job id")]
    MissingTrainingJobId(Uuid),

    #[error("trainer request failed: {0}")]
    Trainer(#[from] TrainerError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Counts for one poll cycle's log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub checked: usize,
    pub failed: usize,
}

/// Drives the reconciliation loop for one provider.
pub struct StatusChecker {
    store: Arc<dyn FineTuneStore>,
    trainer: Arc<dyn TrainerClient>,
    queue: Arc<dyn JobQueue>,
    sink: Arc<dyn AnalyticsSink>,
    provider: String,
    policy: CheckPolicy,
}

impl StatusChecker {
    pub fn new(
        store: Arc<dyn FineTuneStore>,
        trainer: Arc<dyn TrainerClient>,
        queue: Arc<dyn JobQueue>,
        sink: Arc<dyn AnalyticsSink>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            store,
            trainer,
            queue,
            sink,
            provider: provider.into(),
            policy: CheckPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: CheckPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run one poll cycle: fan out over every Training fine-tune for the
    /// provider. Failures are logged per fine-tune and swallowed.
    pub async fn check_all(&self) -> anyhow::Result<CheckSummary> {
        let training = self.store.list_training(&self.provider).await?;
        let mut summary = CheckSummary {
            checked: training.len(),
            failed: 0,
        };

        let checks = training.into_iter().map(|fine_tune| async move {
            let fine_tune_id = fine_tune.id;
            self.check_fine_tune(fine_tune)
                .await
                .map_err(|e| (fine_tune_id, e))
        });

        for result in join_all(checks).await {
            if let Err((fine_tune_id, e)) = result {
                error!(%fine_tune_id, error = %e, "failed to check training status");
                summary.failed += 1;
            }
        }

        Ok(summary)
    }

    /// Reconcile a single fine-tune against the trainer's view of its job.
    pub async fn check_fine_tune(&self, fine_tune: FineTune) -> Result<(), CheckError> {
        let job_id = fine_tune
            .training_job_id
            .clone()
            .ok_or(CheckError::MissingTrainingJobId(fine_tune.id))?;

        let status = self.trainer.training_status(&job_id).await?;

        // The poll and the mutations below are not one transaction; work
        // from a fresh row so a concurrent deletion or transition since the
        // listing is respected. Applied to every branch, not only "done".
        let Some(current) = self.store.get_fine_tune(fine_tune.id).await? else {
            debug!(fine_tune_id = %fine_tune.id, "fine-tune vanished since listing, skipping");
            return Ok(());
        };
        if current.status != FineTuneStatus::Training {
            debug!(
                fine_tune_id = %current.id,
                status = %current.status,
                "fine-tune left TRAINING since listing, skipping"
            );
            return Ok(());
        }

        let signal = match status {
            TrainingJobStatus::Done => {
                let stats = self.store.training_stats(current.id).await?;
                TrainerSignal::Done { stats }
            }
            TrainingJobStatus::Error => TrainerSignal::Error,
            TrainingJobStatus::Pending => TrainerSignal::Pending,
        };

        let effects = plan(&current, signal, Utc::now(), &self.policy);
        for effect in effects {
            self.apply(&current, effect).await?;
        }
        Ok(())
    }

    async fn apply(&self, fine_tune: &FineTune, effect: Effect) -> Result<(), CheckError> {
        match effect {
            Effect::PersistWeights {
                hugging_face_model_id,
            } => {
                // Kicks off the upload and returns almost immediately.
                // TODO: poll the trainer for upload completion once it
                // exposes an export-status endpoint.
                if let Err(e) = self
                    .trainer
                    .persist_model_weights(&hugging_face_model_id)
                    .await
                {
                    warn!(
                        fine_tune_id = %fine_tune.id,
                        model_id = %hugging_face_model_id,
                        error = %e,
                        "failed to kick off weight persistence"
                    );
                }
            }
            Effect::InsertTrainingUsage {
                input_tokens,
                output_tokens,
                cost,
            } => {
                let log = UsageLog::training(fine_tune, input_tokens, output_tokens, cost);
                let inserted = self.store.insert_usage_log(&log).await?;
                if !inserted {
                    // A previous cycle crashed after the insert; the row is
                    // already on the ledger.
                    info!(
                        fine_tune_id = %fine_tune.id,
                        "training usage already recorded, skipping insert"
                    );
                }
            }
            Effect::MarkDeployed {
                num_epochs,
                finished_at,
            } => {
                self.store
                    .mark_deployed(fine_tune.id, num_epochs, finished_at)
                    .await?;
                info!(
                    fine_tune_id = %fine_tune.id,
                    slug = %fine_tune.slug,
                    num_epochs,
                    "fine-tune deployed"
                );
            }
            Effect::MarkErrored {
                error_message,
                finished_at,
            } => {
                self.store
                    .mark_errored(fine_tune.id, error_message, finished_at)
                    .await?;
                warn!(
                    fine_tune_id = %fine_tune.id,
                    slug = %fine_tune.slug,
                    error_message,
                    "fine-tune errored"
                );
            }
            Effect::IncrementRetries => {
                self.store.increment_training_retries(fine_tune.id).await?;
            }
            Effect::EnqueueTrainingRetry => {
                self.queue.enqueue_training_retry(fine_tune.id).await?;
                info!(
                    fine_tune_id = %fine_tune.id,
                    retries = fine_tune.training_auto_retries + 1,
                    "re-enqueued failed training job"
                );
            }
            Effect::EmitTrainingFinished { success } => {
                self.sink
                    .training_finished(fine_tune.project_id, &fine_tune.slug, success);
            }
            Effect::EnqueueEvalJobs => {
                self.queue
                    .enqueue_eval_jobs(fine_tune.dataset_id, fine_tune.id)
                    .await?;
            }
        }
        Ok(())
    }

    /// Poll forever on a fixed interval. Cycles are awaited before the next
    /// tick fires, so two cycles for the same provider never overlap.
    pub async fn run(&self, poll_interval: Duration) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.check_all().await {
                Ok(summary) => {
                    if summary.checked > 0 {
                        info!(
                            provider = %self.provider,
                            checked = summary.checked,
                            failed = summary.failed,
                            "poll cycle finished"
                        );
                    }
                }
                Err(e) => error!(provider = %self.provider, error = %e, "poll cycle failed"),
            }
        }
    }
}

//! Pure transition planning for a fine-tune under reconciliation.
//!
//! `plan` maps (current record, trainer signal, clock, policy) to an ordered
//! list of effects. It performs no I/O itself; the status checker applies the
//! effects afterwards, so a crash mid-apply never leaves a half-planned
//! decision behind.

use crate::epochs::calculate_num_epochs;
use crate::fine_tune::{FineTune, TrainingStats};
use crate::pricing::calculate_cost;
use chrono::{DateTime, Duration, Utc};

/// Sometimes training jobs fail for no reason, so failed jobs are re-enqueued
/// this many times before the failure sticks.
pub const MAX_AUTO_RETRIES: u32 = 2;

/// A job still pending after this long is declared dead.
pub const DEFAULT_TRAINING_TIMEOUT_HOURS: i64 = 24;

pub const TRAINING_FAILED_MESSAGE: &str = "Training job failed";
pub const TRAINING_TIMED_OUT_MESSAGE: &str = "Training job timed out";

/// Tunables for one reconciliation pass.
#[derive(Debug, Clone, Copy)]
pub struct CheckPolicy {
    pub max_auto_retries: u32,
    pub training_timeout: Duration,
}

impl Default for CheckPolicy {
    fn default() -> Self {
        Self {
            max_auto_retries: MAX_AUTO_RETRIES,
            training_timeout: Duration::hours(DEFAULT_TRAINING_TIMEOUT_HOURS),
        }
    }
}

/// What the external trainer reported for the job, enriched with the
/// aggregates a completion needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerSignal {
    Done { stats: TrainingStats },
    Error,
    Pending,
}

/// One side effect the status checker must apply, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Kick off the weight export. Best effort: the upload is never
    /// verified, and a failure must not abort the remaining effects.
    PersistWeights { hugging_face_model_id: String },
    /// Append the run's single usage summary row. Token counts are already
    /// multiplied by the epoch count.
    InsertTrainingUsage {
        input_tokens: u64,
        output_tokens: u64,
        cost: f64,
    },
    MarkDeployed {
        num_epochs: u32,
        finished_at: DateTime<Utc>,
    },
    MarkErrored {
        error_message: &'static str,
        finished_at: DateTime<Utc>,
    },
    IncrementRetries,
    EnqueueTrainingRetry,
    EmitTrainingFinished { success: bool },
    EnqueueEvalJobs,
}

/// Decide what happens to a Training fine-tune given the trainer's signal.
///
/// The caller is expected to pass a freshly read record, not the one the
/// poll cycle started from.
pub fn plan(
    fine_tune: &FineTune,
    signal: TrainerSignal,
    now: DateTime<Utc>,
    policy: &CheckPolicy,
) -> Vec<Effect> {
    match signal {
        TrainerSignal::Done { stats } => {
            let num_epochs = calculate_num_epochs(stats.num_entries);
            let input_tokens = stats.total_pruned_input_tokens * num_epochs as u64;
            let output_tokens = stats.total_output_tokens * num_epochs as u64;
            let cost = calculate_cost(fine_tune, input_tokens + output_tokens, 0, 0);

            let mut effects = Vec::new();
            if let Some(model_id) = &fine_tune.hugging_face_model_id {
                effects.push(Effect::PersistWeights {
                    hugging_face_model_id: model_id.clone(),
                });
            }
            effects.push(Effect::InsertTrainingUsage {
                input_tokens,
                output_tokens,
                cost,
            });
            effects.push(Effect::MarkDeployed {
                num_epochs,
                finished_at: now,
            });
            effects.push(Effect::EmitTrainingFinished { success: true });
            effects.push(Effect::EnqueueEvalJobs);
            effects
        }
        TrainerSignal::Error => {
            let mut effects = Vec::new();
            if fine_tune.training_auto_retries < policy.max_auto_retries {
                effects.push(Effect::IncrementRetries);
                effects.push(Effect::EnqueueTrainingRetry);
            } else {
                effects.push(Effect::MarkErrored {
                    error_message: TRAINING_FAILED_MESSAGE,
                    finished_at: now,
                });
            }
            // Even when the job will be retried, the failed attempt is
            // worth knowing about.
            effects.push(Effect::EmitTrainingFinished { success: false });
            effects
        }
        TrainerSignal::Pending => {
            if now - fine_tune.created_at > policy.training_timeout {
                vec![
                    Effect::MarkErrored {
                        error_message: TRAINING_TIMED_OUT_MESSAGE,
                        finished_at: now,
                    },
                    Effect::EmitTrainingFinished { success: false },
                ]
            } else {
                Vec::new()
            }
        }
    }
}

use crate::fine_tune::FineTune;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// What kind of activity a usage row records.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UsageType {
    /// One row summarizing a whole training run.
    Training,
    /// Inference against the model from the project's own eval jobs.
    Testing,
    /// Inference served through the external API.
    External,
    /// Inference answered from the completion cache.
    CacheHit,
}

impl UsageType {
    /// Inference rows are everything except the per-run training summary.
    pub fn is_inference(&self) -> bool {
        !matches!(self, UsageType::Training)
    }
}

/// Append-only ledger row recording billable token volume and cost.
/// Never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageLog {
    pub id: Uuid,
    pub fine_tune_id: Uuid,
    pub project_id: Uuid,
    pub usage_type: UsageType,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub billable: bool,
    pub created_at: DateTime<Utc>,
}

impl UsageLog {
    pub fn new(
        fine_tune_id: Uuid,
        project_id: Uuid,
        usage_type: UsageType,
        input_tokens: u64,
        output_tokens: u64,
        cost: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            fine_tune_id,
            project_id,
            usage_type,
            input_tokens,
            output_tokens,
            cost,
            billable: cost > 0.0,
            created_at: Utc::now(),
        }
    }

    /// The single summary row for a completed training run. Token counts are
    /// expected to be pre-multiplied by the epoch count.
    pub fn training(fine_tune: &FineTune, input_tokens: u64, output_tokens: u64, cost: f64) -> Self {
        Self::new(
            fine_tune.id,
            fine_tune.project_id,
            UsageType::Training,
            input_tokens,
            output_tokens,
            cost,
        )
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

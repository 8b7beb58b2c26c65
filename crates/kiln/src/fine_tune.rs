use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle status of a fine-tune.
///
/// `Deployed` and `Error` are terminal; a record never leaves either state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FineTuneStatus {
    Pending,
    Training,
    Deployed,
    Error,
}

impl FineTuneStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FineTuneStatus::Deployed | FineTuneStatus::Error)
    }
}

/// One customer-initiated training job and its lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FineTune {
    pub id: Uuid,
    /// Human-readable name, unique within the project.
    pub slug: String,
    pub project_id: Uuid,
    pub dataset_id: Uuid,
    /// Which training backend runs this job, e.g. "kiln".
    pub provider: String,
    /// Base model identifier the rate card is keyed by.
    pub base_model: String,
    pub status: FineTuneStatus,
    /// Handle into the external trainer. Required once status reaches Training.
    pub training_job_id: Option<String>,
    pub training_auto_retries: u32,
    /// When present, finished weights are exported under this id.
    pub hugging_face_model_id: Option<String>,
    /// Computed and frozen when the run completes.
    pub num_epochs: Option<u32>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub training_finished_at: Option<DateTime<Utc>>,
}

impl FineTune {
    pub fn new(
        slug: impl Into<String>,
        project_id: Uuid,
        dataset_id: Uuid,
        provider: impl Into<String>,
        base_model: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            slug: slug.into(),
            project_id,
            dataset_id,
            provider: provider.into(),
            base_model: base_model.into(),
            status: FineTuneStatus::Pending,
            training_job_id: None,
            training_auto_retries: 0,
            hugging_face_model_id: None,
            num_epochs: None,
            error_message: None,
            created_at: Utc::now(),
            training_finished_at: None,
        }
    }
}

/// One training example consumed by a run. Read-only aggregate source for
/// token accounting; never mutated by the reconciliation core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FineTuneTrainingEntry {
    pub id: Uuid,
    pub fine_tune_id: Uuid,
    pub pruned_input_tokens: u64,
    pub output_tokens: u64,
    pub created_at: DateTime<Utc>,
}

impl FineTuneTrainingEntry {
    pub fn new(fine_tune_id: Uuid, pruned_input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            fine_tune_id,
            pruned_input_tokens,
            output_tokens,
            created_at: Utc::now(),
        }
    }
}

/// Aggregated statistics over a fine-tune's training entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainingStats {
    pub num_entries: u64,
    pub total_pruned_input_tokens: u64,
    pub total_output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_strings() {
        for status in [
            FineTuneStatus::Pending,
            FineTuneStatus::Training,
            FineTuneStatus::Deployed,
            FineTuneStatus::Error,
        ] {
            let stored = status.to_string();
            assert_eq!(stored.parse::<FineTuneStatus>().unwrap(), status);
        }
        assert_eq!(FineTuneStatus::Deployed.to_string(), "DEPLOYED");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(FineTuneStatus::Deployed.is_terminal());
        assert!(FineTuneStatus::Error.is_terminal());
        assert!(!FineTuneStatus::Pending.is_terminal());
        assert!(!FineTuneStatus::Training.is_terminal());
    }

    #[test]
    fn test_new_fine_tune_defaults() {
        let fine_tune = FineTune::new(
            "wise-hornet",
            Uuid::new_v4(),
            Uuid::new_v4(),
            "kiln",
            "mistralai/Mistral-7B-v0.1",
        );
        assert_eq!(fine_tune.status, FineTuneStatus::Pending);
        assert_eq!(fine_tune.training_auto_retries, 0);
        assert!(fine_tune.training_job_id.is_none());
        assert!(fine_tune.training_finished_at.is_none());
    }
}

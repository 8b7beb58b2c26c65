//! Relational storage for fine-tunes, training entries, and usage logs.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::fine_tune::{FineTune, FineTuneTrainingEntry, TrainingStats};
use crate::usage::UsageLog;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Trait for fine-tune storage backends.
#[async_trait]
pub trait FineTuneStore: Send + Sync {
    /// Insert a new fine-tune record.
    async fn create_fine_tune(&self, fine_tune: &FineTune) -> Result<()>;

    /// Fetch a fine-tune by id.
    async fn get_fine_tune(&self, id: Uuid) -> Result<Option<FineTune>>;

    /// Delete a fine-tune. Returns whether a row existed.
    async fn delete_fine_tune(&self, id: Uuid) -> Result<bool>;

    /// All fine-tunes currently training on the given provider, oldest first.
    async fn list_training(&self, provider: &str) -> Result<Vec<FineTune>>;

    /// All fine-tunes belonging to a project, oldest first.
    async fn fine_tunes_for_project(&self, project_id: Uuid) -> Result<Vec<FineTune>>;

    /// Terminal success transition: status becomes Deployed and the epoch
    /// count is frozen.
    async fn mark_deployed(
        &self,
        id: Uuid,
        num_epochs: u32,
        finished_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Terminal failure transition: status becomes Error with a
    /// human-readable message.
    async fn mark_errored(
        &self,
        id: Uuid,
        error_message: &str,
        finished_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Bump the auto-retry counter by one. Status is left untouched.
    async fn increment_training_retries(&self, id: Uuid) -> Result<()>;

    /// Record one training example for a fine-tune.
    async fn add_training_entry(&self, entry: &FineTuneTrainingEntry) -> Result<()>;

    /// Aggregate token statistics over a fine-tune's training entries.
    async fn training_stats(&self, fine_tune_id: Uuid) -> Result<TrainingStats>;

    /// Append a usage row. Returns false when the row was dropped because a
    /// training summary already exists for the fine-tune (at most one
    /// TRAINING row per fine-tune; other usage types always insert).
    async fn insert_usage_log(&self, log: &UsageLog) -> Result<bool>;

    /// Usage rows for a project with `start <= created_at <= end`,
    /// oldest first.
    async fn usage_logs_for_project(
        &self,
        project_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageLog>>;
}

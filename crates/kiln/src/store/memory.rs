use super::FineTuneStore;
use crate::fine_tune::{FineTune, FineTuneStatus, FineTuneTrainingEntry, TrainingStats};
use crate::usage::{UsageLog, UsageType};
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory storage implementation for testing and development.
///
/// Clones share the underlying maps, so a clone can stand in for a second
/// handle onto the same database.
#[derive(Clone)]
pub struct MemoryStore {
    fine_tunes: Arc<RwLock<HashMap<Uuid, FineTune>>>,
    training_entries: Arc<RwLock<Vec<FineTuneTrainingEntry>>>,
    usage_logs: Arc<RwLock<Vec<UsageLog>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            fine_tunes: Arc::new(RwLock::new(HashMap::new())),
            training_entries: Arc::new(RwLock::new(Vec::new())),
            usage_logs: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FineTuneStore for MemoryStore {
    async fn create_fine_tune(&self, fine_tune: &FineTune) -> Result<()> {
        let mut fine_tunes = self.fine_tunes.write().await;
        if fine_tunes.contains_key(&fine_tune.id) {
            bail!("fine-tune {} already exists", fine_tune.id);
        }
        fine_tunes.insert(fine_tune.id, fine_tune.clone());
        Ok(())
    }

    async fn get_fine_tune(&self, id: Uuid) -> Result<Option<FineTune>> {
        let fine_tunes = self.fine_tunes.read().await;
        Ok(fine_tunes.get(&id).cloned())
    }

    async fn delete_fine_tune(&self, id: Uuid) -> Result<bool> {
        let mut fine_tunes = self.fine_tunes.write().await;
        Ok(fine_tunes.remove(&id).is_some())
    }

    async fn list_training(&self, provider: &str) -> Result<Vec<FineTune>> {
        let fine_tunes = self.fine_tunes.read().await;
        let mut training: Vec<FineTune> = fine_tunes
            .values()
            .filter(|ft| ft.provider == provider && ft.status == FineTuneStatus::Training)
            .cloned()
            .collect();
        training.sort_by_key(|ft| ft.created_at);
        Ok(training)
    }

    async fn fine_tunes_for_project(&self, project_id: Uuid) -> Result<Vec<FineTune>> {
        let fine_tunes = self.fine_tunes.read().await;
        let mut for_project: Vec<FineTune> = fine_tunes
            .values()
            .filter(|ft| ft.project_id == project_id)
            .cloned()
            .collect();
        for_project.sort_by_key(|ft| ft.created_at);
        Ok(for_project)
    }

    async fn mark_deployed(
        &self,
        id: Uuid,
        num_epochs: u32,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut fine_tunes = self.fine_tunes.write().await;
        let Some(fine_tune) = fine_tunes.get_mut(&id) else {
            bail!("fine-tune {} not found", id);
        };
        fine_tune.status = FineTuneStatus::Deployed;
        fine_tune.num_epochs = Some(num_epochs);
        fine_tune.training_finished_at = Some(finished_at);
        Ok(())
    }

    async fn mark_errored(
        &self,
        id: Uuid,
        error_message: &str,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut fine_tunes = self.fine_tunes.write().await;
        let Some(fine_tune) = fine_tunes.get_mut(&id) else {
            bail!("fine-tune {} not found", id);
        };
        fine_tune.status = FineTuneStatus::Error;
        fine_tune.error_message = Some(error_message.to_string());
        fine_tune.training_finished_at = Some(finished_at);
        Ok(())
    }

    async fn increment_training_retries(&self, id: Uuid) -> Result<()> {
        let mut fine_tunes = self.fine_tunes.write().await;
        let Some(fine_tune) = fine_tunes.get_mut(&id) else {
            bail!("fine-tune {} not found", id);
        };
        fine_tune.training_auto_retries += 1;
        Ok(())
    }

    async fn add_training_entry(&self, entry: &FineTuneTrainingEntry) -> Result<()> {
        let mut entries = self.training_entries.write().await;
        entries.push(entry.clone());
        Ok(())
    }

    async fn training_stats(&self, fine_tune_id: Uuid) -> Result<TrainingStats> {
        let entries = self.training_entries.read().await;
        let mut stats = TrainingStats::default();
        for entry in entries.iter().filter(|e| e.fine_tune_id == fine_tune_id) {
            stats.num_entries += 1;
            stats.total_pruned_input_tokens += entry.pruned_input_tokens;
            stats.total_output_tokens += entry.output_tokens;
        }
        Ok(stats)
    }

    async fn insert_usage_log(&self, log: &UsageLog) -> Result<bool> {
        let mut logs = self.usage_logs.write().await;
        if log.usage_type == UsageType::Training {
            let already_recorded = logs
                .iter()
                .any(|l| l.fine_tune_id == log.fine_tune_id && l.usage_type == UsageType::Training);
            if already_recorded {
                return Ok(false);
            }
        }
        logs.push(log.clone());
        Ok(true)
    }

    async fn usage_logs_for_project(
        &self,
        project_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageLog>> {
        let logs = self.usage_logs.read().await;
        let mut in_range: Vec<UsageLog> = logs
            .iter()
            .filter(|l| l.project_id == project_id && l.created_at >= start && l.created_at <= end)
            .cloned()
            .collect();
        in_range.sort_by_key(|l| l.created_at);
        Ok(in_range)
    }
}

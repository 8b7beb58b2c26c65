use super::FineTuneStore;
use crate::fine_tune::{FineTune, FineTuneStatus, FineTuneTrainingEntry, TrainingStats};
use crate::usage::UsageLog;
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use uuid::Uuid;

/// SQLite-backed storage implementation for production use.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

// Timestamps are stored as fixed-width RFC 3339 strings so that string
// comparison in SQL stays chronological.
fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

fn fine_tune_from_row(row: &SqliteRow) -> Result<FineTune> {
    Ok(FineTune {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        slug: row.get("slug"),
        project_id: Uuid::parse_str(&row.get::<String, _>("project_id"))?,
        dataset_id: Uuid::parse_str(&row.get::<String, _>("dataset_id"))?,
        provider: row.get("provider"),
        base_model: row.get("base_model"),
        status: row.get::<String, _>("status").parse()?,
        training_job_id: row.get("training_job_id"),
        training_auto_retries: row.get::<i64, _>("training_auto_retries") as u32,
        hugging_face_model_id: row.get("hugging_face_model_id"),
        num_epochs: row.get::<Option<i64>, _>("num_epochs").map(|n| n as u32),
        error_message: row.get("error_message"),
        created_at: decode_timestamp(&row.get::<String, _>("created_at"))?,
        training_finished_at: row
            .get::<Option<String>, _>("training_finished_at")
            .as_deref()
            .map(decode_timestamp)
            .transpose()?,
    })
}

fn usage_log_from_row(row: &SqliteRow) -> Result<UsageLog> {
    Ok(UsageLog {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        fine_tune_id: Uuid::parse_str(&row.get::<String, _>("fine_tune_id"))?,
        project_id: Uuid::parse_str(&row.get::<String, _>("project_id"))?,
        usage_type: row.get::<String, _>("usage_type").parse()?,
        input_tokens: row.get::<i64, _>("input_tokens") as u64,
        output_tokens: row.get::<i64, _>("output_tokens") as u64,
        cost: row.get("cost"),
        billable: row.get("billable"),
        created_at: decode_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

impl SqliteStore {
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true)
            .busy_timeout(std::time::Duration::from_secs(5))
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = sqlx::SqlitePool::connect_with(options).await?;

        let store = Self { pool };
        store.create_schema().await?;
        Ok(store)
    }

    pub async fn from_pool(pool: Pool<Sqlite>) -> Result<Self> {
        let store = Self { pool };
        store.create_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fine_tunes (
                id TEXT PRIMARY KEY,
                slug TEXT NOT NULL,
                project_id TEXT NOT NULL,
                dataset_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                base_model TEXT NOT NULL,
                status TEXT NOT NULL,
                training_job_id TEXT,
                training_auto_retries INTEGER NOT NULL DEFAULT 0,
                hugging_face_model_id TEXT,
                num_epochs INTEGER,
                error_message TEXT,
                created_at TEXT NOT NULL,
                training_finished_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_fine_tunes_provider_status
             ON fine_tunes(provider, status)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_fine_tunes_project ON fine_tunes(project_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS training_entries (
                id TEXT PRIMARY KEY,
                fine_tune_id TEXT NOT NULL,
                pruned_input_tokens INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_training_entries_fine_tune
             ON training_entries(fine_tune_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS usage_logs (
                id TEXT PRIMARY KEY,
                fine_tune_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                usage_type TEXT NOT NULL,
                input_tokens INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                cost REAL NOT NULL,
                billable BOOLEAN NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // At most one training summary row per fine-tune; makes the
        // usage insert safe to re-attempt after a crash.
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_usage_logs_one_training_row
             ON usage_logs(fine_tune_id) WHERE usage_type = 'TRAINING'",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_usage_logs_project_created
             ON usage_logs(project_id, created_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl FineTuneStore for SqliteStore {
    async fn create_fine_tune(&self, fine_tune: &FineTune) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fine_tunes (
                id, slug, project_id, dataset_id, provider, base_model, status,
                training_job_id, training_auto_retries, hugging_face_model_id,
                num_epochs, error_message, created_at, training_finished_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(fine_tune.id.to_string())
        .bind(&fine_tune.slug)
        .bind(fine_tune.project_id.to_string())
        .bind(fine_tune.dataset_id.to_string())
        .bind(&fine_tune.provider)
        .bind(&fine_tune.base_model)
        .bind(fine_tune.status.to_string())
        .bind(&fine_tune.training_job_id)
        .bind(fine_tune.training_auto_retries as i64)
        .bind(&fine_tune.hugging_face_model_id)
        .bind(fine_tune.num_epochs.map(|n| n as i64))
        .bind(&fine_tune.error_message)
        .bind(encode_timestamp(fine_tune.created_at))
        .bind(fine_tune.training_finished_at.map(encode_timestamp))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_fine_tune(&self, id: Uuid) -> Result<Option<FineTune>> {
        let row = sqlx::query("SELECT * FROM fine_tunes WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(fine_tune_from_row).transpose()
    }

    async fn delete_fine_tune(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM fine_tunes WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_training(&self, provider: &str) -> Result<Vec<FineTune>> {
        let rows = sqlx::query(
            "SELECT * FROM fine_tunes WHERE provider = ? AND status = ? ORDER BY created_at",
        )
        .bind(provider)
        .bind(FineTuneStatus::Training.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(fine_tune_from_row).collect()
    }

    async fn fine_tunes_for_project(&self, project_id: Uuid) -> Result<Vec<FineTune>> {
        let rows = sqlx::query("SELECT * FROM fine_tunes WHERE project_id = ? ORDER BY created_at")
            .bind(project_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(fine_tune_from_row).collect()
    }

    async fn mark_deployed(
        &self,
        id: Uuid,
        num_epochs: u32,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE fine_tunes SET status = ?, num_epochs = ?, training_finished_at = ?
             WHERE id = ?",
        )
        .bind(FineTuneStatus::Deployed.to_string())
        .bind(num_epochs as i64)
        .bind(encode_timestamp(finished_at))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("fine-tune {} not found", id);
        }
        Ok(())
    }

    async fn mark_errored(
        &self,
        id: Uuid,
        error_message: &str,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE fine_tunes SET status = ?, error_message = ?, training_finished_at = ?
             WHERE id = ?",
        )
        .bind(FineTuneStatus::Error.to_string())
        .bind(error_message)
        .bind(encode_timestamp(finished_at))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("fine-tune {} not found", id);
        }
        Ok(())
    }

    async fn increment_training_retries(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE fine_tunes SET training_auto_retries = training_auto_retries + 1
             WHERE id = ?",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("fine-tune {} not found", id);
        }
        Ok(())
    }

    async fn add_training_entry(&self, entry: &FineTuneTrainingEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO training_entries (
                id, fine_tune_id, pruned_input_tokens, output_tokens, created_at
            ) VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.fine_tune_id.to_string())
        .bind(entry.pruned_input_tokens as i64)
        .bind(entry.output_tokens as i64)
        .bind(encode_timestamp(entry.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn training_stats(&self, fine_tune_id: Uuid) -> Result<TrainingStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(id) AS num_entries,
                COALESCE(SUM(pruned_input_tokens), 0) AS total_pruned_input_tokens,
                COALESCE(SUM(output_tokens), 0) AS total_output_tokens
            FROM training_entries
            WHERE fine_tune_id = ?
            "#,
        )
        .bind(fine_tune_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(TrainingStats {
            num_entries: row.get::<i64, _>("num_entries") as u64,
            total_pruned_input_tokens: row.get::<i64, _>("total_pruned_input_tokens") as u64,
            total_output_tokens: row.get::<i64, _>("total_output_tokens") as u64,
        })
    }

    async fn insert_usage_log(&self, log: &UsageLog) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO usage_logs (
                id, fine_tune_id, project_id, usage_type, input_tokens,
                output_tokens, cost, billable, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (fine_tune_id) WHERE usage_type = 'TRAINING' DO NOTHING
            "#,
        )
        .bind(log.id.to_string())
        .bind(log.fine_tune_id.to_string())
        .bind(log.project_id.to_string())
        .bind(log.usage_type.to_string())
        .bind(log.input_tokens as i64)
        .bind(log.output_tokens as i64)
        .bind(log.cost)
        .bind(log.billable)
        .bind(encode_timestamp(log.created_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn usage_logs_for_project(
        &self,
        project_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageLog>> {
        let rows = sqlx::query(
            "SELECT * FROM usage_logs
             WHERE project_id = ? AND created_at >= ? AND created_at <= ?
             ORDER BY created_at",
        )
        .bind(project_id.to_string())
        .bind(encode_timestamp(start))
        .bind(encode_timestamp(end))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(usage_log_from_row).collect()
    }
}

// Exercised end to end in tests/sqlite_store_test.rs; the memory and sqlite
// backends share the trait-level tests there.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_encode_fixed_width() {
        let early = Utc::now();
        let late = early + chrono::Duration::microseconds(1);

        let encoded_early = encode_timestamp(early);
        let encoded_late = encode_timestamp(late);
        assert_eq!(encoded_early.len(), encoded_late.len());
        assert!(encoded_early < encoded_late);
    }

    #[test]
    fn test_timestamp_round_trip() {
        let ts = Utc::now();
        let decoded = decode_timestamp(&encode_timestamp(ts)).unwrap();
        assert_eq!(decoded.timestamp_micros(), ts.timestamp_micros());
    }
}

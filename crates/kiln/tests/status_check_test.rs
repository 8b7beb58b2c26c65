//! Full reconciliation cycles over the SQLite store.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use kiln::analytics::NoopSink;
use kiln::fine_tune::{FineTune, FineTuneStatus, FineTuneTrainingEntry};
use kiln::pricing::calculate_cost;
use kiln::queue::{MemoryJobQueue, QueuedJob};
use kiln::status_check::{CheckSummary, StatusChecker};
use kiln::store::{FineTuneStore, SqliteStore};
use kiln::trainer::{TrainerClient, TrainerError, TrainingJobStatus};
use kiln::usage::UsageType;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

struct ScriptedTrainer {
    statuses: HashMap<String, Result<TrainingJobStatus, TrainerError>>,
}

impl ScriptedTrainer {
    fn new(statuses: &[(&str, Result<TrainingJobStatus, TrainerError>)]) -> Self {
        Self {
            statuses: statuses
                .iter()
                .map(|(job_id, status)| (job_id.to_string(), status.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl TrainerClient for ScriptedTrainer {
    async fn training_status(
        &self,
        training_job_id: &str,
    ) -> Result<TrainingJobStatus, TrainerError> {
        self.statuses
            .get(training_job_id)
            .cloned()
            .unwrap_or(Ok(TrainingJobStatus::Pending))
    }

    async fn persist_model_weights(&self, _hugging_face_model_id: &str) -> Result<(), TrainerError> {
        Ok(())
    }
}

struct Fixture {
    _dir: TempDir,
    store: Arc<SqliteStore>,
    queue: Arc<MemoryJobQueue>,
    checker: StatusChecker,
}

async fn fixture(trainer: ScriptedTrainer) -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::new(dir.path().join("kiln.db")).await.unwrap());
    let queue = Arc::new(MemoryJobQueue::new());
    let checker = StatusChecker::new(
        store.clone(),
        Arc::new(trainer),
        queue.clone(),
        Arc::new(NoopSink),
        "kiln",
    );
    Fixture {
        _dir: dir,
        store,
        queue,
        checker,
    }
}

fn training_fine_tune(slug: &str, job_id: &str) -> FineTune {
    let mut fine_tune = FineTune::new(
        slug,
        Uuid::new_v4(),
        Uuid::new_v4(),
        "kiln",
        "mistralai/Mistral-7B-v0.1",
    );
    fine_tune.status = FineTuneStatus::Training;
    fine_tune.training_job_id = Some(job_id.to_string());
    fine_tune
}

#[tokio::test]
async fn test_completed_run_is_billed_and_deployed() {
    let f = fixture(ScriptedTrainer::new(&[("job-1", Ok(TrainingJobStatus::Done))])).await;
    let fine_tune = training_fine_tune("swift-gull", "job-1");
    f.store.create_fine_tune(&fine_tune).await.unwrap();

    for i in 0..500u64 {
        let output = if i < 200 { 1 } else { 0 };
        f.store
            .add_training_entry(&FineTuneTrainingEntry::new(fine_tune.id, 2, output))
            .await
            .unwrap();
    }

    let summary = f.checker.check_all().await.unwrap();
    assert_eq!(summary, CheckSummary { checked: 1, failed: 0 });

    let deployed = f.store.get_fine_tune(fine_tune.id).await.unwrap().unwrap();
    assert_eq!(deployed.status, FineTuneStatus::Deployed);
    assert_eq!(deployed.num_epochs, Some(6));
    assert!(deployed.training_finished_at.is_some());

    let logs = f
        .store
        .usage_logs_for_project(
            fine_tune.project_id,
            Utc::now() - Duration::hours(1),
            Utc::now() + Duration::hours(1),
        )
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].usage_type, UsageType::Training);
    assert_eq!(logs[0].input_tokens, 6000);
    assert_eq!(logs[0].output_tokens, 1200);
    let expected_cost = calculate_cost(&fine_tune, 7200, 0, 0);
    assert!((logs[0].cost - expected_cost).abs() < 1e-9);

    assert_eq!(
        f.queue.drain(),
        vec![QueuedJob::EvalJobs {
            dataset_id: fine_tune.dataset_id,
            fine_tune_id: fine_tune.id,
        }]
    );
}

#[tokio::test]
async fn test_three_strikes_then_terminal_error() {
    let fine_tune = training_fine_tune("doomed-loon", "job-1");

    let f = fixture(ScriptedTrainer::new(&[(
        "job-1",
        Ok(TrainingJobStatus::Error),
    )]))
    .await;
    f.store.create_fine_tune(&fine_tune).await.unwrap();

    // First two failures re-enqueue the job
    for expected_retries in [1, 2] {
        let summary = f.checker.check_all().await.unwrap();
        assert_eq!(summary.failed, 0);

        let stored = f.store.get_fine_tune(fine_tune.id).await.unwrap().unwrap();
        assert_eq!(stored.status, FineTuneStatus::Training);
        assert_eq!(stored.training_auto_retries, expected_retries);
        assert_eq!(
            f.queue.drain(),
            vec![QueuedJob::TrainingRetry {
                fine_tune_id: fine_tune.id,
            }]
        );
    }

    // Third failure is terminal
    f.checker.check_all().await.unwrap();
    let stored = f.store.get_fine_tune(fine_tune.id).await.unwrap().unwrap();
    assert_eq!(stored.status, FineTuneStatus::Error);
    assert_eq!(stored.error_message.as_deref(), Some("Training job failed"));
    assert_eq!(stored.training_auto_retries, 2);
    assert!(f.queue.drain().is_empty());

    // Terminal records fall out of the poll set
    let summary = f.checker.check_all().await.unwrap();
    assert_eq!(summary, CheckSummary { checked: 0, failed: 0 });
}

#[tokio::test]
async fn test_stuck_job_times_out_after_a_day() {
    let f = fixture(ScriptedTrainer::new(&[])).await;

    let mut stuck = training_fine_tune("stuck-eider", "job-old");
    stuck.created_at = Utc::now() - Duration::hours(25);
    let fresh = training_fine_tune("fresh-eider", "job-new");
    f.store.create_fine_tune(&stuck).await.unwrap();
    f.store.create_fine_tune(&fresh).await.unwrap();

    f.checker.check_all().await.unwrap();

    let stuck = f.store.get_fine_tune(stuck.id).await.unwrap().unwrap();
    assert_eq!(stuck.status, FineTuneStatus::Error);
    assert_eq!(stuck.error_message.as_deref(), Some("Training job timed out"));

    let fresh = f.store.get_fine_tune(fresh.id).await.unwrap().unwrap();
    assert_eq!(fresh.status, FineTuneStatus::Training);
    assert!(fresh.error_message.is_none());
}

#[tokio::test]
async fn test_cycle_survives_a_broken_record() {
    let f = fixture(ScriptedTrainer::new(&[
        (
            "job-a",
            Err(TrainerError::ServerError("trainer is down".to_string())),
        ),
        ("job-b", Ok(TrainingJobStatus::Done)),
    ]))
    .await;

    // One record violates the job-id invariant, one hits a trainer outage,
    // one completes
    let mut invariant_breaker = training_fine_tune("no-job-id", "unused");
    invariant_breaker.training_job_id = None;
    let outage = training_fine_tune("outage", "job-a");
    let healthy = training_fine_tune("healthy", "job-b");

    for fine_tune in [&invariant_breaker, &outage, &healthy] {
        f.store.create_fine_tune(fine_tune).await.unwrap();
    }

    let summary = f.checker.check_all().await.unwrap();
    assert_eq!(summary, CheckSummary { checked: 3, failed: 2 });

    // The failures saw no state change
    for fine_tune in [&invariant_breaker, &outage] {
        let stored = f.store.get_fine_tune(fine_tune.id).await.unwrap().unwrap();
        assert_eq!(stored.status, FineTuneStatus::Training);
        assert_eq!(stored.training_auto_retries, 0);
    }

    let healthy = f.store.get_fine_tune(healthy.id).await.unwrap().unwrap();
    assert_eq!(healthy.status, FineTuneStatus::Deployed);
}

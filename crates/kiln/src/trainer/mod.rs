//! Contract with the external training service.

mod http;

pub use http::HttpTrainerClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status the trainer reports for a job.
///
/// The trainer moves jobs through more granular internal states; anything
/// that is not a terminal `done` or `error` is treated as still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingJobStatus {
    Done,
    Error,
    #[serde(other)]
    Pending,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrainerError {
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Training job not found: {0}")]
    NotFound(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),
}

fn is_network_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || (err.status().is_none() && err.is_request())
}

impl From<reqwest::Error> for TrainerError {
    fn from(error: reqwest::Error) -> Self {
        if is_network_error(&error) {
            let msg = if error.is_timeout() {
                "request to the trainer timed out".to_string()
            } else if error.is_connect() {
                match error.url().and_then(|u| u.host_str().map(str::to_string)) {
                    Some(host) => format!("could not connect to the trainer at {}", host),
                    None => "could not connect to the trainer".to_string(),
                }
            } else {
                error.to_string()
            };
            return TrainerError::NetworkError(msg);
        }

        match error.status() {
            Some(status) => TrainerError::RequestFailed(format!("{} (status: {})", error, status)),
            None => TrainerError::RequestFailed(error.to_string()),
        }
    }
}

/// Client for the service that actually runs training jobs.
///
/// The reconciliation core only observes jobs through this interface; it
/// never starts them (submission is the job queue's side of the contract).
#[async_trait]
pub trait TrainerClient: Send + Sync {
    /// Current status of a training job.
    async fn training_status(&self, training_job_id: &str)
        -> Result<TrainingJobStatus, TrainerError>;

    /// Ask the trainer to copy finished weights into long-term storage.
    /// Returns once the export has been accepted, not once it has finished.
    async fn persist_model_weights(&self, hugging_face_model_id: &str) -> Result<(), TrainerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parses_known_values() {
        let status: TrainingJobStatus = serde_json::from_str("\"done\"").unwrap();
        assert_eq!(status, TrainingJobStatus::Done);
        let status: TrainingJobStatus = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(status, TrainingJobStatus::Error);
    }

    #[test]
    fn test_unknown_status_is_pending() {
        for wire in ["\"pending\"", "\"queued\"", "\"exporting_weights\""] {
            let status: TrainingJobStatus = serde_json::from_str(wire).unwrap();
            assert_eq!(status, TrainingJobStatus::Pending);
        }
    }
}

use super::{TrainerClient, TrainerError, TrainingJobStatus};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the trainer's web endpoints.
pub struct HttpTrainerClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrainingStatusResponse {
    status: TrainingJobStatus,
}

impl HttpTrainerClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, TrainerError> {
        Self::with_timeout(base_url, api_key, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TrainerError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
        })
    }

    fn build_url(&self, path: &str) -> Result<Url, TrainerError> {
        let mut base_url = Url::parse(&self.base_url)
            .map_err(|e| TrainerError::RequestFailed(format!("invalid trainer URL: {}", e)))?;

        let base_path = base_url.path();
        if !base_path.is_empty() && base_path != "/" && !base_path.ends_with('/') {
            base_url.set_path(&format!("{}/", base_path));
        }

        base_url
            .join(path)
            .map_err(|e| TrainerError::RequestFailed(format!("failed to construct URL: {}", e)))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    async fn check_status(&self, response: Response) -> Result<Response, TrainerError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = if body.trim().is_empty() {
            status.to_string()
        } else {
            format!("{}: {}", status, body.trim())
        };

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(TrainerError::Authentication(detail))
            }
            StatusCode::NOT_FOUND => Err(TrainerError::NotFound(detail)),
            s if s.is_server_error() => Err(TrainerError::ServerError(detail)),
            _ => Err(TrainerError::RequestFailed(detail)),
        }
    }
}

#[async_trait]
impl TrainerClient for HttpTrainerClient {
    async fn training_status(
        &self,
        training_job_id: &str,
    ) -> Result<TrainingJobStatus, TrainerError> {
        let url = self.build_url("training_status")?;
        let request = self
            .client
            .get(url)
            .query(&[("training_job_id", training_job_id)]);

        let response = self.authorize(request).send().await?;
        let response = self.check_status(response).await?;
        let body: TrainingStatusResponse = response.json().await?;
        Ok(body.status)
    }

    async fn persist_model_weights(&self, hugging_face_model_id: &str) -> Result<(), TrainerError> {
        let url = self.build_url("persist_model_weights")?;
        let request = self
            .client
            .post(url)
            .query(&[("hugging_face_model_id", hugging_face_model_id)]);

        let response = self.authorize(request).send().await?;
        self.check_status(response).await?;
        Ok(())
    }
}

impl fmt::Debug for HttpTrainerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTrainerClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[hidden]"))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_joins_paths() {
        let client = HttpTrainerClient::new("http://localhost:8000", None).unwrap();
        let url = client.build_url("training_status").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/training_status");
    }

    #[test]
    fn test_build_url_preserves_base_path() {
        let client = HttpTrainerClient::new("http://localhost:8000/trainer/v1", None).unwrap();
        let url = client.build_url("training_status").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/trainer/v1/training_status"
        );
    }

    #[test]
    fn test_build_url_rejects_garbage() {
        let client = HttpTrainerClient::new("not a url", None).unwrap();
        assert!(client.build_url("training_status").is_err());
    }
}

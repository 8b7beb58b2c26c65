//! PostHog analytics - fires once per finished training attempt.

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

static TELEMETRY_DISABLED: Lazy<AtomicBool> = Lazy::new(|| {
    std::env::var("KILN_TELEMETRY_OFF")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
        .into()
});

/// Fire-and-forget event emission. Implementations must never block the
/// caller on delivery and must never surface delivery failures.
pub trait AnalyticsSink: Send + Sync {
    /// A training attempt ended. Emitted for deployments, terminal errors,
    /// timeouts, and failed attempts that will be auto-retried.
    fn training_finished(&self, project_id: Uuid, slug: &str, success: bool);
}

/// Sink that drops every event. For embedding and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl AnalyticsSink for NoopSink {
    fn training_finished(&self, _project_id: Uuid, _slug: &str, _success: bool) {}
}

/// Sink backed by PostHog. Capture happens on a spawned task; the
/// `KILN_TELEMETRY_OFF` environment variable disables it entirely.
pub struct PostHogSink {
    api_key: String,
}

impl PostHogSink {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }
}

impl AnalyticsSink for PostHogSink {
    fn training_finished(&self, project_id: Uuid, slug: &str, success: bool) {
        if TELEMETRY_DISABLED.load(Ordering::Relaxed) {
            return;
        }

        let api_key = self.api_key.clone();
        let slug = slug.to_string();
        tokio::spawn(async move {
            let _ = send_training_finished(api_key, project_id, slug, success).await;
        });
    }
}

async fn send_training_finished(
    api_key: String,
    project_id: Uuid,
    slug: String,
    success: bool,
) -> Result<(), String> {
    let client = posthog_rs::client(api_key.as_str()).await;
    let mut event = posthog_rs::Event::new("fine_tune_training_finished".to_string(), project_id.to_string());

    event.insert_prop("fine_tune_slug", slug).ok();
    event.insert_prop("success", success).ok();
    event.insert_prop("version", env!("CARGO_PKG_VERSION")).ok();

    client.capture(event).await.map_err(|e| format!("{:?}", e))
}

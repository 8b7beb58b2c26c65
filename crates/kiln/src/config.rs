//! Runtime configuration for the reconciliation worker.
//!
//! Everything is read from `KILN_*` environment variables with sensible
//! defaults, so the worker runs out of the box against a local database.

use crate::transition::{CheckPolicy, DEFAULT_TRAINING_TIMEOUT_HOURS, MAX_AUTO_RETRIES};
use chrono::Duration;
use std::time::Duration as StdDuration;

pub const DEFAULT_PROVIDER: &str = "kiln";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_DB_PATH: &str = "kiln.db";
pub const DEFAULT_TRAINER_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone)]
pub struct KilnConfig {
    /// Provider whose fine-tunes this worker reconciles.
    pub provider: String,
    pub poll_interval: StdDuration,
    pub training_timeout_hours: i64,
    pub max_auto_retries: u32,
    pub db_path: String,
    pub trainer_url: String,
    pub trainer_api_key: Option<String>,
    pub posthog_api_key: Option<String>,
}

impl Default for KilnConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            poll_interval: StdDuration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            training_timeout_hours: DEFAULT_TRAINING_TIMEOUT_HOURS,
            max_auto_retries: MAX_AUTO_RETRIES,
            db_path: DEFAULT_DB_PATH.to_string(),
            trainer_url: DEFAULT_TRAINER_URL.to_string(),
            trainer_api_key: None,
            posthog_api_key: None,
        }
    }
}

impl KilnConfig {
    /// Build a config from the environment, falling back to defaults for
    /// anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            provider: env_string("KILN_PROVIDER").unwrap_or(defaults.provider),
            poll_interval: env_parse("KILN_POLL_INTERVAL_SECS")
                .map(StdDuration::from_secs)
                .unwrap_or(defaults.poll_interval),
            training_timeout_hours: env_parse("KILN_TRAINING_TIMEOUT_HOURS")
                .unwrap_or(defaults.training_timeout_hours),
            max_auto_retries: env_parse("KILN_MAX_AUTO_RETRIES")
                .unwrap_or(defaults.max_auto_retries),
            db_path: env_string("KILN_DB_PATH").unwrap_or(defaults.db_path),
            trainer_url: env_string("KILN_TRAINER_URL").unwrap_or(defaults.trainer_url),
            trainer_api_key: env_string("KILN_TRAINER_API_KEY"),
            posthog_api_key: env_string("KILN_POSTHOG_API_KEY"),
        }
    }

    pub fn check_policy(&self) -> CheckPolicy {
        CheckPolicy {
            max_auto_retries: self.max_auto_retries,
            training_timeout: Duration::hours(self.training_timeout_hours),
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_string(name)?.parse().ok()
}

//! Reconciliation core for hosted fine-tune training jobs.
//!
//! A fine-tune moves through PENDING, TRAINING, and the terminal DEPLOYED or
//! ERROR states. While a job trains on the external trainer, the
//! [`status_check::StatusChecker`] polls its status on a fixed interval and
//! drives the transition: billing the completed run into the usage ledger,
//! auto-retrying flaky failures a bounded number of times, and timing out
//! jobs that never report back.
//!
//! The crate owns the lifecycle logic and the aggregates it needs; the
//! surrounding application provides the collaborators behind the
//! [`store::FineTuneStore`], [`trainer::TrainerClient`], [`queue::JobQueue`],
//! and [`analytics::AnalyticsSink`] traits. Default implementations (SQLite,
//! HTTP, in-memory, PostHog) ship for the worker binary and for tests.

pub mod analytics;
pub mod config;
pub mod epochs;
pub mod fine_tune;
pub mod pricing;
pub mod queue;
pub mod status_check;
pub mod store;
pub mod trainer;
pub mod transition;
pub mod usage;
pub mod usage_stats;

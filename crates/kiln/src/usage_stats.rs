//! Per-project usage reporting over a date range.
//!
//! Aggregates the usage ledger into the shape the billing dashboard renders:
//! daily periods (with empty days filled in), project totals, and a
//! per-fine-tune breakdown ordered by query volume.

use crate::store::FineTuneStore;
use crate::usage::UsageLog;
use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// One day's activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsagePeriod {
    pub period: NaiveDate,
    /// Every ledger row that day, training included.
    pub num_queries: u64,
    pub training_cost: f64,
    /// Billable inference spend only.
    pub inference_cost: f64,
}

impl UsagePeriod {
    fn empty(period: NaiveDate) -> Self {
        Self {
            period,
            num_queries: 0,
            training_cost: 0.0,
            inference_cost: 0.0,
        }
    }
}

/// Project-wide totals for the range.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageTotals {
    /// Billable spend across all usage types.
    pub cost: f64,
    pub total_training_spend: f64,
    /// Billable inference spend.
    pub total_inference_spend: f64,
    /// Inference tokens only; training volume is tracked separately.
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_training_tokens: u64,
    pub num_queries: u64,
}

/// One fine-tune's share of the range, ordered by query count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FineTuneUsageSummary {
    pub fine_tune_id: Uuid,
    pub slug: String,
    pub base_model: String,
    pub provider: String,
    pub created_at: DateTime<Utc>,
    /// Inference requests only; the training summary row is not a query.
    pub num_queries: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Billable spend, training included.
    pub cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectUsage {
    pub periods: Vec<UsagePeriod>,
    pub totals: UsageTotals,
    pub fine_tunes: Vec<FineTuneUsageSummary>,
}

/// Build the usage report for a project between `start` and `end` inclusive.
pub async fn project_usage(
    store: &dyn FineTuneStore,
    project_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<ProjectUsage> {
    let logs = store.usage_logs_for_project(project_id, start, end).await?;
    let fine_tunes = store.fine_tunes_for_project(project_id).await?;

    let mut by_day: HashMap<NaiveDate, UsagePeriod> = HashMap::new();
    let mut totals = UsageTotals::default();
    let mut by_fine_tune: HashMap<Uuid, FineTuneUsageSummary> = HashMap::new();

    for log in &logs {
        let day = log.created_at.date_naive();
        let period = by_day
            .entry(day)
            .or_insert_with(|| UsagePeriod::empty(day));
        period.num_queries += 1;
        apply_costs(log, &mut period.training_cost, &mut period.inference_cost);

        totals.num_queries += 1;
        apply_costs(
            log,
            &mut totals.total_training_spend,
            &mut totals.total_inference_spend,
        );
        if log.billable {
            totals.cost += log.cost;
        }
        if log.usage_type.is_inference() {
            totals.total_input_tokens += log.input_tokens;
            totals.total_output_tokens += log.output_tokens;
        } else {
            totals.total_training_tokens += log.input_tokens + log.output_tokens;
        }

        let Some(fine_tune) = fine_tunes.iter().find(|ft| ft.id == log.fine_tune_id) else {
            // Ledger rows survive fine-tune deletion; they still count in
            // the totals but have no breakdown row to attach to.
            continue;
        };
        let summary = by_fine_tune
            .entry(fine_tune.id)
            .or_insert_with(|| FineTuneUsageSummary {
                fine_tune_id: fine_tune.id,
                slug: fine_tune.slug.clone(),
                base_model: fine_tune.base_model.clone(),
                provider: fine_tune.provider.clone(),
                created_at: fine_tune.created_at,
                num_queries: 0,
                input_tokens: 0,
                output_tokens: 0,
                cost: 0.0,
            });
        if log.usage_type.is_inference() {
            summary.num_queries += 1;
            summary.input_tokens += log.input_tokens;
            summary.output_tokens += log.output_tokens;
        }
        if log.billable {
            summary.cost += log.cost;
        }
    }

    // Fill in missing periods so the chart has a point for every day
    let mut periods = Vec::new();
    let mut day = start.date_naive();
    let last = end.date_naive();
    while day <= last {
        periods.push(
            by_day
                .remove(&day)
                .unwrap_or_else(|| UsagePeriod::empty(day)),
        );
        day += Duration::days(1);
    }

    let mut fine_tune_summaries: Vec<FineTuneUsageSummary> = by_fine_tune.into_values().collect();
    fine_tune_summaries.sort_by(|a, b| b.num_queries.cmp(&a.num_queries));

    Ok(ProjectUsage {
        periods,
        totals,
        fine_tunes: fine_tune_summaries,
    })
}

fn apply_costs(log: &UsageLog, training_cost: &mut f64, inference_cost: &mut f64) {
    if log.usage_type.is_inference() {
        if log.billable {
            *inference_cost += log.cost;
        }
    } else {
        *training_cost += log.cost;
    }
}

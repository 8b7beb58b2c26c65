//! Rate card and cost calculation for fine-tune usage.
//!
//! Rates are keyed by base model. Training tokens are billed at the
//! training rate; serving traffic at the input/output rates.

use crate::fine_tune::FineTune;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-model rates (USD per 1M tokens).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelRates {
    /// Cost per 1M tokens consumed while training.
    pub training_per_1m: f64,
    /// Cost per 1M prompt tokens at serving time.
    pub input_per_1m: f64,
    /// Cost per 1M completion tokens at serving time.
    pub output_per_1m: f64,
}

impl ModelRates {
    pub fn new(training_per_1m: f64, input_per_1m: f64, output_per_1m: f64) -> Self {
        Self {
            training_per_1m,
            input_per_1m,
            output_per_1m,
        }
    }

    /// Self-hosted deployments are not billed.
    pub fn free() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

impl Default for ModelRates {
    fn default() -> Self {
        Self {
            training_per_1m: 4.0,
            input_per_1m: 1.2,
            output_per_1m: 1.6,
        }
    }
}

/// Rate card for trainable base models
static MODEL_RATES: Lazy<HashMap<&str, ModelRates>> = Lazy::new(|| {
    let mut m = HashMap::new();

    // =========================================================================
    // Mistral 7B family
    // =========================================================================
    m.insert("mistralai/Mistral-7B-v0.1", ModelRates::new(4.0, 1.2, 1.6));
    m.insert(
        "teknium/OpenHermes-2.5-Mistral-7B",
        ModelRates::new(4.0, 1.2, 1.6),
    );
    m.insert(
        "HuggingFaceH4/zephyr-7b-beta",
        ModelRates::new(4.0, 1.2, 1.6),
    );
    // Catch-all for newer Mistral releases
    m.insert("mistralai/*", ModelRates::new(4.0, 1.2, 1.6));

    // =========================================================================
    // Llama 2
    // =========================================================================
    m.insert("meta-llama/Llama-2-7b-hf", ModelRates::new(4.0, 1.2, 1.6));
    m.insert("meta-llama/Llama-2-13b-hf", ModelRates::new(8.0, 2.4, 3.2));

    // =========================================================================
    // Self-hosted deployments (free)
    // =========================================================================
    m.insert("local/*", ModelRates::free());

    m
});

/// Look up rates for a base model.
pub fn rates_for_model(base_model: &str) -> ModelRates {
    // Try exact match first
    if let Some(rates) = MODEL_RATES.get(base_model) {
        return *rates;
    }

    // Try prefix match for wildcards (e.g. "mistralai/*")
    for (pattern, rates) in MODEL_RATES.iter() {
        if let Some(prefix) = pattern.strip_suffix("/*") {
            if base_model.starts_with(prefix) {
                return *rates;
            }
        }
    }

    // Conservative default for models missing from the card
    ModelRates::default()
}

/// Cost in USD for a volume of tokens against a fine-tune's base model.
/// Deterministic, no side effects.
pub fn calculate_cost(
    fine_tune: &FineTune,
    training_tokens: u64,
    input_tokens: u64,
    output_tokens: u64,
) -> f64 {
    let rates = rates_for_model(&fine_tune.base_model);

    let training_cost = (training_tokens as f64 / 1_000_000.0) * rates.training_per_1m;
    let input_cost = (input_tokens as f64 / 1_000_000.0) * rates.input_per_1m;
    let output_cost = (output_tokens as f64 / 1_000_000.0) * rates.output_per_1m;

    training_cost + input_cost + output_cost
}

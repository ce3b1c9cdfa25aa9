//! Up-front cost projection for an enrichment run.

use std::fmt;
use std::time::Duration;

use tracing::{info, warn};

/// USD price per token for one model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelRates {
    pub input: f64,
    pub output: f64,
}

/// Known per-token rates, keyed by model id.
const RATE_TABLE: &[(&str, ModelRates)] = &[
    (
        "gpt-4-0125-preview",
        ModelRates {
            input: 0.01 / 1000.0,
            output: 0.03 / 1000.0,
        },
    ),
    (
        "gpt-4-turbo",
        ModelRates {
            input: 0.01 / 1000.0,
            output: 0.03 / 1000.0,
        },
    ),
    (
        "gpt-4o",
        ModelRates {
            input: 0.005 / 1000.0,
            output: 0.015 / 1000.0,
        },
    ),
    (
        "gpt-4o-mini",
        ModelRates {
            input: 0.00015 / 1000.0,
            output: 0.0006 / 1000.0,
        },
    ),
];

/// Rates for `model`, if it is in the table.
pub fn rates_for(model: &str) -> Option<ModelRates> {
    RATE_TABLE
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, rates)| *rates)
}

/// Rough token count: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

/// Projected spend for a run, extrapolated from one sample contract.
#[derive(Debug, Clone, PartialEq)]
pub struct CostEstimate {
    pub sample_contract: String,
    pub sample_chars: usize,
    pub tokens_per_item: u64,
    pub cost_per_item: f64,
    pub item_count: usize,
    pub total: f64,
}

impl CostEstimate {
    /// Project the cost of `item_count` items shaped like `sample_source`.
    pub fn project(
        sample_contract: &str,
        sample_source: &str,
        rates: ModelRates,
        assumed_output_tokens: u64,
        item_count: usize,
    ) -> Self {
        let tokens_per_item = estimate_tokens(sample_source);
        let cost_per_item =
            tokens_per_item as f64 * rates.input + assumed_output_tokens as f64 * rates.output;

        Self {
            sample_contract: sample_contract.to_string(),
            sample_chars: sample_source.chars().count(),
            tokens_per_item,
            cost_per_item,
            item_count,
            total: cost_per_item * item_count as f64,
        }
    }
}

impl fmt::Display for CostEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Estimated cost for {} contracts: ${:.2}",
            self.item_count, self.total
        )?;
        write!(
            f,
            "(based on {} size of {} chars)",
            self.sample_contract, self.sample_chars
        )
    }
}

/// Give the operator `period` to abort before spending starts.
///
/// Returns immediately for a zero period.
pub async fn grace_window(period: Duration) {
    if period.is_zero() {
        return;
    }
    info!(
        secs = period.as_secs_f64(),
        "press ctrl+c to cancel, or wait to continue"
    );
    tokio::time::sleep(period).await;
}

/// Log that no estimate could be produced.
pub(crate) fn report_unavailable(reason: &str) {
    warn!(reason, "cost estimate unavailable");
}

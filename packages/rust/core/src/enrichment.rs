//! Enrichment driver.
//!
//! Walks the ranked contracts in order: fetch source, analyze, checkpoint.
//! A contract whose source or analysis fails is skipped and the run goes on.
//! After every successful analysis the whole accumulated dataset is rewritten,
//! so an interrupted run loses at most the contract in flight.

use std::time::Duration;

use tracing::{info, instrument, warn};

use contractscope_harvest::SourceStore;
use contractscope_shared::{AnalysisRecord, EnrichmentSettings, RankedContract, Result};

use crate::checkpoint::CheckpointStore;
use crate::engine::AnalysisEngine;

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// Why a contract was left out of the dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    SourceUnavailable(String),
    AnalysisFailed(String),
}

/// A contract that was skipped, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipEvent {
    pub rank: u32,
    pub contract: String,
    pub reason: SkipReason,
}

/// Outcome of an enrichment run.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentReport {
    /// Contracts the driver tried, successes and skips alike.
    pub attempted: usize,
    /// Contracts analyzed and persisted.
    pub analyzed: usize,
    /// The dataset as last written to disk.
    pub records: Vec<AnalysisRecord>,
    pub skips: Vec<SkipEvent>,
}

// ---------------------------------------------------------------------------
// Options and progress
// ---------------------------------------------------------------------------

/// Run limits for the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichmentOptions {
    /// Maximum number of ranked contracts to attempt.
    pub max_items: usize,
    /// Pause after each persisted contract.
    pub inter_item_delay: Duration,
}

impl From<&EnrichmentSettings> for EnrichmentOptions {
    fn from(settings: &EnrichmentSettings) -> Self {
        Self {
            max_items: settings.max_contracts,
            inter_item_delay: settings.inter_item_delay(),
        }
    }
}

/// Progress callback for enrichment.
pub trait EnrichmentProgress: Send + Sync {
    /// A contract is about to be fetched and analyzed.
    fn item_started(&self, current: usize, total: usize, contract: &str);
    /// A contract was analyzed and the dataset rewritten.
    fn item_saved(&self, current: usize, total: usize, contract: &str);
    fn item_skipped(&self, skip: &SkipEvent);
    fn done(&self, report: &EnrichmentReport);
}

/// No-op enrichment progress.
pub struct SilentEnrichmentProgress;

impl EnrichmentProgress for SilentEnrichmentProgress {
    fn item_started(&self, _current: usize, _total: usize, _contract: &str) {}
    fn item_saved(&self, _current: usize, _total: usize, _contract: &str) {}
    fn item_skipped(&self, _skip: &SkipEvent) {}
    fn done(&self, _report: &EnrichmentReport) {}
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Enrich up to `options.max_items` ranked contracts.
///
/// Per-contract failures become [`SkipEvent`]s. Only a failed checkpoint
/// write aborts the run.
#[instrument(skip_all, fields(ranked = ranked.len(), max_items = options.max_items))]
pub async fn enrich<S, E>(
    ranked: &[RankedContract],
    sources: &S,
    engine: &E,
    store: &CheckpointStore,
    options: &EnrichmentOptions,
    progress: &dyn EnrichmentProgress,
) -> Result<EnrichmentReport>
where
    S: SourceStore,
    E: AnalysisEngine,
{
    let total = options.max_items.min(ranked.len());
    let mut report = EnrichmentReport::default();

    info!(total, path = %store.path().display(), "starting enrichment");

    for (i, contract) in ranked.iter().take(total).enumerate() {
        let current = i + 1;
        report.attempted += 1;
        progress.item_started(current, total, &contract.contract);
        info!(current, total, contract = %contract.contract, "analyzing contract");

        let source = match sources.fetch_source(&contract.contract).await {
            Ok(source) => source,
            Err(e) => {
                skip(&mut report, contract, SkipReason::SourceUnavailable(e.to_string()), progress);
                continue;
            }
        };

        let analysis = match engine.analyze(&source).await {
            Ok(analysis) => analysis,
            Err(e) => {
                skip(&mut report, contract, SkipReason::AnalysisFailed(e.to_string()), progress);
                continue;
            }
        };

        report.records.push(AnalysisRecord::new(contract, source, analysis));
        store.persist(&report.records)?;
        report.analyzed += 1;
        progress.item_saved(current, total, &contract.contract);

        if !options.inter_item_delay.is_zero() {
            tokio::time::sleep(options.inter_item_delay).await;
        }
    }

    info!(
        attempted = report.attempted,
        analyzed = report.analyzed,
        skipped = report.skips.len(),
        "enrichment complete"
    );
    progress.done(&report);

    Ok(report)
}

fn skip(
    report: &mut EnrichmentReport,
    contract: &RankedContract,
    reason: SkipReason,
    progress: &dyn EnrichmentProgress,
) {
    match &reason {
        SkipReason::SourceUnavailable(e) => {
            warn!(contract = %contract.contract, error = %e, "failed to fetch source, skipping")
        }
        SkipReason::AnalysisFailed(e) => {
            warn!(contract = %contract.contract, error = %e, "failed to analyze, skipping")
        }
    }

    let event = SkipEvent {
        rank: contract.rank,
        contract: contract.contract.clone(),
        reason,
    };
    progress.item_skipped(&event);
    report.skips.push(event);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Core domain types for ranked and analyzed contracts.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CallRecord
// ---------------------------------------------------------------------------

/// A single contract-call event pulled from the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    /// Fully-qualified contract id (`<address>.<name>`).
    pub contract_id: String,
    /// Block time of the call, in epoch seconds.
    pub timestamp_secs: i64,
}

impl CallRecord {
    pub fn new(contract_id: impl Into<String>, timestamp_secs: i64) -> Self {
        Self {
            contract_id: contract_id.into(),
            timestamp_secs,
        }
    }
}

// ---------------------------------------------------------------------------
// RankedContract
// ---------------------------------------------------------------------------

/// One entry of the ranked dataset (`popular_contracts.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedContract {
    /// 1-based position by call count.
    pub rank: u32,
    /// Fully-qualified contract id.
    pub contract: String,
    /// Calls observed inside the lookback window.
    pub calls: u64,
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Structured output of the analysis engine for one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    /// Short 1-2 sentence summary.
    pub summary: String,
    /// Long-form walkthrough carrying inline annotations (`<L12>`, `'ident'`, `**bold**`).
    pub explanation: String,
    /// Category tags, unique, in the order the engine produced them.
    pub tags: Vec<String>,
}

impl Analysis {
    /// Drop repeated tags, keeping the first occurrence of each.
    pub fn dedup_tags(mut self) -> Self {
        let mut seen = std::collections::HashSet::new();
        self.tags.retain(|tag| seen.insert(tag.clone()));
        self
    }
}

/// One persisted entry of the analysis dataset (`contract_analyses.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub rank: u32,
    pub contract: String,
    pub calls: u64,
    /// Raw contract source, exactly as fetched.
    pub source: String,
    pub analysis: Analysis,
}

impl AnalysisRecord {
    /// Combine a ranked entry with its fetched source and analysis.
    pub fn new(ranked: &RankedContract, source: String, analysis: Analysis) -> Self {
        Self {
            rank: ranked.rank,
            contract: ranked.contract.clone(),
            calls: ranked.calls,
            source,
            analysis,
        }
    }
}

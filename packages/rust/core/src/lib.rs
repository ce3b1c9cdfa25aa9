//! Pipeline orchestration for contractscope.
//!
//! This crate ties the call feed, source store, and analysis engine together
//! into the two batch stages: ranking contracts by recent calls, and enriching
//! the top of that ranking with engine-written analyses.

pub mod checkpoint;
pub mod cost;
pub mod engine;
pub mod enrichment;
pub mod pipeline;
pub mod prompt;

pub use checkpoint::CheckpointStore;
pub use cost::CostEstimate;
pub use engine::{AnalysisEngine, OpenAiEngine};
pub use enrichment::{
    EnrichmentOptions, EnrichmentProgress, EnrichmentReport, SilentEnrichmentProgress, SkipEvent,
    SkipReason,
};
pub use pipeline::{AnalyzeConfig, ProgressReporter, SilentProgress};

//! Shared types, error model, and configuration for contractscope.
//!
//! This crate is the foundation depended on by all other contractscope crates.
//! It provides:
//! - [`ContractScopeError`]: the unified error type
//! - Domain types ([`CallRecord`], [`RankedContract`], [`AnalysisRecord`], [`Analysis`])
//! - Configuration ([`AppConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AnalysisConfig, AppConfig, EnrichmentSettings, FeedConfig, OutputConfig, RetryConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, read_api_key,
    validate_api_key,
};
pub use error::{ContractScopeError, Result};
pub use types::{Analysis, AnalysisRecord, CallRecord, RankedContract};

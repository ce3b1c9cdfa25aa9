//! Harvesting of contract-call activity from the Hiro API.
//!
//! This crate provides:
//! - [`backoff`]: retrying fetch with exponential backoff that degrades to an explicit empty outcome
//! - [`hiro`]: the paginated call-event feed and the contract source store
//! - [`ranking`]: windowed per-contract call counting and ranking

pub mod backoff;
pub mod hiro;
pub mod ranking;

pub use backoff::{BackoffClient, FetchOutcome, HttpTransport, RetryPolicy, Transport};
pub use hiro::{CallFeed, FeedPage, HiroClient, SourceStore};
pub use ranking::{CallTally, HarvestSummary, Ranking, RankingParams, StopReason, aggregate};

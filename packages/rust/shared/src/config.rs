//! Application configuration for contractscope.
//!
//! User config lives at `~/.contractscope/contractscope.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ContractScopeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "contractscope.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".contractscope";

/// Longest accepted lookback window, in days.
pub const MAX_LOOKBACK_DAYS: u32 = 36_500;

// ---------------------------------------------------------------------------
// Config structs (matching contractscope.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Call-event feed and source store (Hiro API).
    #[serde(default)]
    pub feed: FeedConfig,

    /// Retry policy shared by all network fetches.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Analysis engine settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Enrichment run limits and pacing.
    #[serde(default)]
    pub enrichment: EnrichmentSettings,

    /// Output file locations.
    #[serde(default)]
    pub output: OutputConfig,
}

/// `[feed]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Base URL of the Hiro API.
    #[serde(default = "default_feed_base_url")]
    pub base_url: String,

    /// Events requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Trailing window, in days, over which calls are counted.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Contracts with fewer calls than this are dropped from the ranking.
    #[serde(default = "default_min_calls")]
    pub min_calls: u64,

    /// Name of the env var holding the (optional) Hiro API key.
    #[serde(default = "default_feed_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout.
    #[serde(default = "default_feed_timeout")]
    pub timeout_secs: u64,

    /// Stop paging after this many pages. Unset means no cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u64>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_feed_base_url(),
            page_size: default_page_size(),
            lookback_days: default_lookback_days(),
            min_calls: default_min_calls(),
            api_key_env: default_feed_api_key_env(),
            timeout_secs: default_feed_timeout(),
            max_pages: None,
        }
    }
}

impl FeedConfig {
    /// Reject values that would stall or break pagination.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(ContractScopeError::config("feed.page_size must be at least 1"));
        }
        if self.lookback_days > MAX_LOOKBACK_DAYS {
            return Err(ContractScopeError::config(format!(
                "feed.lookback_days must be at most {MAX_LOOKBACK_DAYS}, got {}",
                self.lookback_days
            )));
        }
        if self.max_pages == Some(0) {
            return Err(ContractScopeError::config("feed.max_pages must be at least 1 when set"));
        }
        Ok(())
    }
}

fn default_feed_base_url() -> String {
    "https://api.mainnet.hiro.so".into()
}
fn default_page_size() -> u32 {
    50
}
fn default_lookback_days() -> u32 {
    90
}
fn default_min_calls() -> u64 {
    5
}
fn default_feed_api_key_env() -> String {
    "HIRO_API_KEY".into()
}
fn default_feed_timeout() -> u64 {
    30
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per fetch, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first failed attempt; doubles after each further failure.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}

/// `[analysis]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_analysis_base_url")]
    pub base_url: String,

    /// Model used for every analysis.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_analysis_api_key_env")]
    pub api_key_env: String,

    /// Output tokens assumed per contract when estimating cost.
    #[serde(default = "default_assumed_output_tokens")]
    pub assumed_output_tokens: u64,

    /// Per-request timeout.
    #[serde(default = "default_analysis_timeout")]
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            base_url: default_analysis_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            api_key_env: default_analysis_api_key_env(),
            assumed_output_tokens: default_assumed_output_tokens(),
            timeout_secs: default_analysis_timeout(),
        }
    }
}

fn default_analysis_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4-0125-preview".into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_analysis_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_assumed_output_tokens() -> u64 {
    500
}
fn default_analysis_timeout() -> u64 {
    120
}

/// `[enrichment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentSettings {
    /// Maximum number of ranked contracts to analyze in one run.
    #[serde(default = "default_max_contracts")]
    pub max_contracts: usize,

    /// Pause after each persisted analysis.
    #[serde(default = "default_inter_item_delay")]
    pub inter_item_delay_ms: u64,

    /// Pause after the cost estimate so the operator can abort. `0` disables it.
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            max_contracts: default_max_contracts(),
            inter_item_delay_ms: default_inter_item_delay(),
            grace_period_secs: default_grace_period(),
        }
    }
}

impl EnrichmentSettings {
    pub fn inter_item_delay(&self) -> Duration {
        Duration::from_millis(self.inter_item_delay_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

fn default_max_contracts() -> usize {
    50
}
fn default_inter_item_delay() -> u64 {
    1000
}
fn default_grace_period() -> u64 {
    5
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Ranked dataset written by `rank`, read by `analyze`.
    #[serde(default = "default_ranked_path")]
    pub ranked_path: PathBuf,

    /// Analysis dataset checkpointed by `analyze`.
    #[serde(default = "default_analyses_path")]
    pub analyses_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            ranked_path: default_ranked_path(),
            analyses_path: default_analyses_path(),
        }
    }
}

fn default_ranked_path() -> PathBuf {
    PathBuf::from("popular_contracts.json")
}
fn default_analyses_path() -> PathBuf {
    PathBuf::from("contract_analyses.json")
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.contractscope/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ContractScopeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.contractscope/contractscope.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ContractScopeError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        ContractScopeError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.feed.validate()?;

    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ContractScopeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ContractScopeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ContractScopeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read an optional API key from the named env var. Empty values count as unset.
pub fn read_api_key(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok().filter(|v| !v.is_empty())
}

/// Check that the analysis engine API key is set and return it.
///
/// This is the run's fatal precondition: callers check it before any network call.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.analysis.api_key_env;
    read_api_key(var_name).ok_or_else(|| {
        ContractScopeError::config(format!(
            "analysis API key not found. Set the {var_name} environment variable."
        ))
    })
}

//! Retrying HTTP fetch with exponential backoff.
//!
//! Every network call in contractscope goes through [`BackoffClient::fetch`].
//! A failed attempt is retried after `base_delay * 2^attempt`; once the attempt
//! budget is spent the client returns [`FetchOutcome::Exhausted`] instead of an
//! error, so callers can degrade (treat a page as empty, skip a contract).

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, error, warn};
use url::Url;

use contractscope_shared::{ContractScopeError, Result, RetryConfig};

/// User-Agent string for all outbound requests.
const USER_AGENT: &str = concat!("contractscope/", env!("CARGO_PKG_VERSION"));

/// Query parameters as `(name, value)` pairs.
pub type Query<'a> = [(&'a str, String)];

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// A single GET round-trip. Implementations do not retry.
pub trait Transport: Send + Sync {
    fn get(&self, url: &Url, query: &Query<'_>) -> impl Future<Output = Result<String>> + Send;
}

/// `reqwest`-backed transport. Non-2xx statuses are failures.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    api_key: Option<String>,
}

impl HttpTransport {
    /// Build a transport with the given timeout, sending `x-api-key` when a key is given.
    pub fn new(timeout: Duration, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ContractScopeError::Network(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, api_key })
    }
}

impl Transport for HttpTransport {
    async fn get(&self, url: &Url, query: &Query<'_>) -> Result<String> {
        let mut request = self.client.get(url.clone()).query(query);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ContractScopeError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContractScopeError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| ContractScopeError::Network(format!("{url}: body read failed: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay slept after failed attempt `attempt` (0-based): `base_delay * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// BackoffClient
// ---------------------------------------------------------------------------

/// Result of a retried fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A successful response body.
    Body(String),
    /// Every attempt failed; `last_error` is the final failure message.
    Exhausted { attempts: u32, last_error: String },
}

impl FetchOutcome {
    /// The body, or `None` when retries were exhausted.
    pub fn into_body(self) -> Option<String> {
        match self {
            Self::Body(body) => Some(body),
            Self::Exhausted { .. } => None,
        }
    }
}

/// Stateless retrying wrapper around a [`Transport`].
///
/// The policy is plain data read on every call, so one client can serve any
/// number of sequential fetches.
#[derive(Debug, Clone)]
pub struct BackoffClient<T = HttpTransport> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: Transport> BackoffClient<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// GET `url` with `query`, retrying failures with exponential backoff.
    pub async fn fetch(&self, url: &Url, query: &Query<'_>) -> FetchOutcome {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            match self.transport.get(url, query).await {
                Ok(body) => return FetchOutcome::Body(body),
                Err(e) => {
                    warn!(%url, attempt = attempt + 1, attempts, error = %e, "fetch attempt failed");
                    last_error = e.to_string();

                    if attempt + 1 < attempts {
                        let delay = self.policy.delay_for(attempt);
                        debug!(%url, delay_ms = delay.as_millis(), "retrying after backoff");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        error!(%url, attempts, error = %last_error, "all fetch attempts failed");
        FetchOutcome::Exhausted {
            attempts,
            last_error,
        }
    }
}

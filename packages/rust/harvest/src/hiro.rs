//! Hiro API collaborators: the contract-call feed and the contract source store.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use contractscope_shared::{AppConfig, CallRecord, ContractScopeError, Result, read_api_key};

use crate::backoff::{BackoffClient, FetchOutcome, HttpTransport, RetryPolicy, Transport};

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Paginated source of contract-call events, newest first.
pub trait CallFeed: Send + Sync {
    /// Fetch up to `limit` events starting at `offset`.
    ///
    /// A page with no events means "no more data", whether the feed is
    /// drained or the fetch could not be completed.
    fn fetch_page(&self, offset: u64, limit: u32) -> impl Future<Output = FeedPage> + Send;
}

/// One page of the call feed.
///
/// `events` counts every event the page carried, including ones that are not
/// contract calls, so a page of only non-call events still reads as data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedPage {
    pub events: usize,
    pub records: Vec<CallRecord>,
}

impl FeedPage {
    /// A page where every event is a contract call.
    pub fn from_records(records: Vec<CallRecord>) -> Self {
        Self {
            events: records.len(),
            records,
        }
    }

    /// True when the page carried no events at all.
    pub fn is_empty(&self) -> bool {
        self.events == 0
    }
}

/// Lookup of raw contract source by contract id.
pub trait SourceStore: Send + Sync {
    fn fetch_source(&self, contract_id: &str) -> impl Future<Output = Result<String>> + Send;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TxPage {
    #[serde(default)]
    results: Vec<TxEvent>,
}

#[derive(Debug, Deserialize)]
struct TxEvent {
    burn_block_time: i64,
    #[serde(default)]
    contract_call: Option<ContractCall>,
}

#[derive(Debug, Deserialize)]
struct ContractCall {
    contract_id: String,
}

#[derive(Debug, Deserialize)]
struct ContractInfo {
    #[serde(default)]
    source_code: Option<String>,
}

// ---------------------------------------------------------------------------
// HiroClient
// ---------------------------------------------------------------------------

/// Hiro API client implementing both [`CallFeed`] and [`SourceStore`].
#[derive(Debug, Clone)]
pub struct HiroClient<T = HttpTransport> {
    http: BackoffClient<T>,
    base_url: String,
}

impl HiroClient<HttpTransport> {
    /// Build a client from the `[feed]` and `[retry]` config sections.
    ///
    /// The Hiro key is optional; without it requests go out unauthenticated.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = read_api_key(&config.feed.api_key_env);
        if api_key.is_none() {
            debug!(var = %config.feed.api_key_env, "no Hiro API key set, using public rate limits");
        }

        let transport =
            HttpTransport::new(Duration::from_secs(config.feed.timeout_secs), api_key)?;
        let policy = RetryPolicy::from(&config.retry);

        Ok(Self::new(
            BackoffClient::new(transport, policy),
            &config.feed.base_url,
        ))
    }
}

impl<T: Transport> HiroClient<T> {
    pub fn new(http: BackoffClient<T>, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let raw = format!("{}/{path}", self.base_url);
        Url::parse(&raw)
            .map_err(|e| ContractScopeError::config(format!("invalid feed URL '{raw}': {e}")))
    }
}

impl<T: Transport> CallFeed for HiroClient<T> {
    async fn fetch_page(&self, offset: u64, limit: u32) -> FeedPage {
        let url = match self.endpoint("extended/v1/tx") {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "cannot build feed URL");
                return FeedPage::default();
            }
        };

        let query = [
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
            ("type", "contract_call".to_string()),
        ];

        let body = match self.http.fetch(&url, &query).await {
            FetchOutcome::Body(body) => body,
            FetchOutcome::Exhausted { .. } => {
                warn!(offset, "feed page unavailable, treating as empty");
                return FeedPage::default();
            }
        };

        match serde_json::from_str::<TxPage>(&body) {
            Ok(page) => {
                let events = page.results.len();
                let records: Vec<CallRecord> = page
                    .results
                    .into_iter()
                    .filter_map(|tx| {
                        tx.contract_call
                            .map(|call| CallRecord::new(call.contract_id, tx.burn_block_time))
                    })
                    .collect();
                if records.len() < events {
                    debug!(offset, ignored = events - records.len(), "non-call events on page");
                }
                FeedPage { events, records }
            }
            Err(e) => {
                warn!(offset, error = %e, "malformed feed page, treating as empty");
                FeedPage::default()
            }
        }
    }
}

impl<T: Transport> SourceStore for HiroClient<T> {
    async fn fetch_source(&self, contract_id: &str) -> Result<String> {
        let url = self.endpoint(&format!("extended/v1/contract/{contract_id}"))?;

        let body = match self.http.fetch(&url, &[]).await {
            FetchOutcome::Body(body) => body,
            FetchOutcome::Exhausted { last_error, .. } => {
                return Err(ContractScopeError::source_unavailable(contract_id, last_error));
            }
        };

        let info: ContractInfo = serde_json::from_str(&body).map_err(|e| {
            ContractScopeError::source_unavailable(contract_id, format!("malformed response: {e}"))
        })?;

        info.source_code
            .ok_or_else(|| ContractScopeError::source_unavailable(contract_id, "no source_code"))
    }
}

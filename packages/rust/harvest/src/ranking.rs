//! Windowed call counting and contract ranking.
//!
//! [`aggregate`] walks the call feed page by page from offset 0, counting
//! calls per contract until it meets an empty page or an event older than the
//! lookback cutoff. The cutoff is checked per event: the first old event ends
//! the scan of its page and of the whole feed, so the feed is assumed to be
//! ordered newest first.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, instrument, warn};

use contractscope_shared::{FeedConfig, RankedContract};

use crate::hiro::{CallFeed, FeedPage};

/// Number of top entries echoed to the log after ranking.
const LOG_TOP_N: usize = 20;

// ---------------------------------------------------------------------------
// Parameters and results
// ---------------------------------------------------------------------------

/// Inputs to a ranking run.
#[derive(Debug, Clone)]
pub struct RankingParams {
    /// Events requested per page; also the offset stride.
    pub page_size: u32,
    /// Trailing window over which calls count.
    pub lookback: TimeDelta,
    /// Minimum calls for a contract to be ranked.
    pub min_calls: u64,
    /// Stop after this many page fetches, if set.
    pub max_pages: Option<u64>,
}

impl From<&FeedConfig> for RankingParams {
    fn from(config: &FeedConfig) -> Self {
        Self {
            page_size: config.page_size,
            lookback: TimeDelta::days(i64::from(config.lookback_days)),
            min_calls: config.min_calls,
            max_pages: config.max_pages,
        }
    }
}

/// Why pagination stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A page came back empty (feed drained or fetch exhausted).
    EmptyPage,
    /// An event older than the cutoff was reached.
    ReachedOldData,
    /// The `max_pages` cap was hit.
    PageLimit,
}

/// Counters describing a ranking run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestSummary {
    pub pages_fetched: u64,
    pub events_counted: u64,
    pub distinct_contracts: usize,
    pub stop_reason: StopReason,
}

/// Ranked contracts plus the run summary.
#[derive(Debug, Clone)]
pub struct Ranking {
    pub contracts: Vec<RankedContract>,
    pub summary: HarvestSummary,
}

// ---------------------------------------------------------------------------
// CallTally
// ---------------------------------------------------------------------------

/// Per-contract call counts that remember first-seen order.
#[derive(Debug, Clone, Default)]
pub struct CallTally {
    entries: Vec<(String, u64)>,
    index: HashMap<String, usize>,
}

impl CallTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one call for `contract_id`.
    pub fn record(&mut self, contract_id: &str) {
        match self.index.get(contract_id) {
            Some(&i) => self.entries[i].1 += 1,
            None => {
                self.index.insert(contract_id.to_string(), self.entries.len());
                self.entries.push((contract_id.to_string(), 1));
            }
        }
    }

    pub fn distinct(&self) -> usize {
        self.entries.len()
    }

    /// Drop contracts under `min_calls`, order by calls descending (ties keep
    /// first-seen order) and number them from 1.
    pub fn rank(self, min_calls: u64) -> Vec<RankedContract> {
        let mut kept: Vec<(String, u64)> = self
            .entries
            .into_iter()
            .filter(|(_, calls)| *calls >= min_calls)
            .collect();

        // `sort_by` is stable, which is what gives the first-seen tie-break.
        kept.sort_by(|a, b| b.1.cmp(&a.1));

        kept.into_iter()
            .zip(1u32..)
            .map(|((contract, calls), rank)| RankedContract {
                rank,
                contract,
                calls,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Page through `feed`, count calls inside the window ending at `now`, and rank.
///
/// Never fails: a page that cannot be fetched reads as empty and ends the scan
/// with whatever was counted so far. A window reaching past the earliest
/// representable date counts everything, and a zero page size is read as 1.
#[instrument(skip_all, fields(page_size = params.page_size, min_calls = params.min_calls))]
pub async fn aggregate<F: CallFeed>(feed: &F, params: &RankingParams, now: DateTime<Utc>) -> Ranking {
    let cutoff = now
        .checked_sub_signed(params.lookback)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
        .timestamp();
    let page_size = if params.page_size == 0 {
        warn!("page size of 0 requested, using 1");
        1
    } else {
        params.page_size
    };
    let mut tally = CallTally::new();
    let mut offset: u64 = 0;
    let mut pages_fetched: u64 = 0;
    let mut events_counted: u64 = 0;

    info!(cutoff, "starting call harvest");

    let stop_reason = loop {
        if params.max_pages.is_some_and(|max| pages_fetched >= max) {
            warn!(pages_fetched, "page limit reached, stopping harvest early");
            break StopReason::PageLimit;
        }

        debug!(offset, "fetching page");
        let page = feed.fetch_page(offset, page_size).await;
        pages_fetched += 1;

        if page.is_empty() {
            debug!(offset, "empty page");
            break StopReason::EmptyPage;
        }

        let mut reached_old_data = false;
        for record in &page.records {
            if record.timestamp_secs < cutoff {
                reached_old_data = true;
                break;
            }
            tally.record(&record.contract_id);
            events_counted += 1;
        }

        if reached_old_data {
            debug!(offset, "reached events older than the lookback window");
            break StopReason::ReachedOldData;
        }

        offset += u64::from(page_size);
    };

    let summary = HarvestSummary {
        pages_fetched,
        events_counted,
        distinct_contracts: tally.distinct(),
        stop_reason,
    };

    let contracts = tally.rank(params.min_calls);

    info!(
        pages = summary.pages_fetched,
        events = summary.events_counted,
        distinct = summary.distinct_contracts,
        ranked = contracts.len(),
        stop = ?summary.stop_reason,
        "call harvest complete"
    );

    for entry in contracts.iter().take(LOG_TOP_N) {
        info!("{}. {}: {} calls", entry.rank, entry.contract, entry.calls);
    }

    Ranking { contracts, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use contractscope_shared::CallRecord;

    const NOW: i64 = 1_720_000_000;

    /// In-memory feed serving fixed pages by offset.
    struct PagedFeed {
        pages: Vec<Vec<CallRecord>>,
        page_size: u32,
        requested: Mutex<Vec<u64>>,
    }

    impl PagedFeed {
        fn new(page_size: u32, pages: Vec<Vec<CallRecord>>) -> Self {
            Self {
                pages,
                page_size,
                requested: Mutex::new(Vec::new()),
            }
        }

        fn requested(&self) -> Vec<u64> {
            self.requested.lock().unwrap().clone()
        }
    }

    impl CallFeed for PagedFeed {
        async fn fetch_page(&self, offset: u64, _limit: u32) -> FeedPage {
            self.requested.lock().unwrap().push(offset);
            let index = (offset / u64::from(self.page_size)) as usize;
            self.pages
                .get(index)
                .cloned()
                .map(FeedPage::from_records)
                .unwrap_or_default()
        }
    }

    /// Serves pages that carry events but no contract calls, up to `pages`.
    struct NonCallFeed {
        pages: u64,
        tail: Vec<CallRecord>,
        requested: Mutex<Vec<u64>>,
    }

    impl CallFeed for NonCallFeed {
        async fn fetch_page(&self, offset: u64, limit: u32) -> FeedPage {
            self.requested.lock().unwrap().push(offset);
            let index = offset / u64::from(limit);
            if index < self.pages {
                FeedPage {
                    events: limit as usize,
                    records: Vec::new(),
                }
            } else if index == self.pages {
                FeedPage::from_records(self.tail.clone())
            } else {
                FeedPage::default()
            }
        }
    }

    /// Returns the same fresh call for every offset, without ever yielding.
    struct EndlessFeed {
        requested: Mutex<Vec<(u64, u32)>>,
    }

    impl CallFeed for EndlessFeed {
        async fn fetch_page(&self, offset: u64, limit: u32) -> FeedPage {
            self.requested.lock().unwrap().push((offset, limit));
            FeedPage::from_records(vec![call("SP1.loop", 1)])
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(NOW, 0).unwrap()
    }

    fn params(page_size: u32, min_calls: u64) -> RankingParams {
        RankingParams {
            page_size,
            lookback: TimeDelta::days(90),
            min_calls,
            max_pages: None,
        }
    }

    /// A call `secs_ago` seconds before `NOW`.
    fn call(contract: &str, secs_ago: i64) -> CallRecord {
        CallRecord::new(contract, NOW - secs_ago)
    }

    fn old_call(contract: &str) -> CallRecord {
        call(contract, TimeDelta::days(91).num_seconds())
    }

    #[test]
    fn tally_ranks_descending_with_first_seen_ties() {
        let mut tally = CallTally::new();
        for id in ["b", "a", "c", "a", "b", "d", "c", "a"] {
            tally.record(id);
        }
        // a=3, b=2, c=2, d=1; b was seen before c.
        let ranked = tally.rank(2);
        let order: Vec<(&str, u64, u32)> = ranked
            .iter()
            .map(|r| (r.contract.as_str(), r.calls, r.rank))
            .collect();
        assert_eq!(order, vec![("a", 3, 1), ("b", 2, 2), ("c", 2, 3)]);
    }

    #[tokio::test]
    async fn ranks_are_dense_and_descending_above_threshold() {
        let page1 = vec![
            call("SP1.a", 10),
            call("SP1.b", 20),
            call("SP1.a", 30),
            call("SP1.c", 40),
        ];
        let page2 = vec![
            call("SP1.a", 50),
            call("SP1.b", 60),
            call("SP1.d", 70),
            call("SP1.a", 80),
        ];
        let feed = PagedFeed::new(4, vec![page1, page2]);

        let ranking = aggregate(&feed, &params(4, 2), now()).await;

        assert_eq!(
            ranking.contracts,
            vec![
                RankedContract { rank: 1, contract: "SP1.a".into(), calls: 4 },
                RankedContract { rank: 2, contract: "SP1.b".into(), calls: 2 },
            ]
        );
        assert_eq!(ranking.summary.stop_reason, StopReason::EmptyPage);
        assert_eq!(ranking.summary.events_counted, 8);
        assert_eq!(ranking.summary.distinct_contracts, 4);
        assert_eq!(feed.requested(), vec![0, 4, 8]);
    }

    #[tokio::test]
    async fn identical_input_gives_identical_order() {
        let page = vec![
            call("SP1.x", 1),
            call("SP1.y", 2),
            call("SP1.z", 3),
            call("SP1.y", 4),
            call("SP1.x", 5),
            call("SP1.z", 6),
        ];

        let first = aggregate(&PagedFeed::new(6, vec![page.clone()]), &params(6, 1), now()).await;
        let second = aggregate(&PagedFeed::new(6, vec![page]), &params(6, 1), now()).await;

        assert_eq!(first.contracts, second.contracts);
        let order: Vec<&str> = first.contracts.iter().map(|r| r.contract.as_str()).collect();
        assert_eq!(order, vec!["SP1.x", "SP1.y", "SP1.z"]);
    }

    #[tokio::test]
    async fn old_event_stops_the_page_and_the_feed() {
        let page1 = vec![
            call("SP1.a", 10),
            call("SP1.a", 20),
            old_call("SP1.a"),
            // Newer than the cutoff but after the old event: not counted.
            call("SP1.b", 30),
        ];
        let page2 = vec![call("SP1.b", 40), call("SP1.b", 50), call("SP1.b", 60), call("SP1.b", 70)];
        let feed = PagedFeed::new(4, vec![page1, page2]);

        let ranking = aggregate(&feed, &params(4, 1), now()).await;

        assert_eq!(ranking.summary.stop_reason, StopReason::ReachedOldData);
        assert_eq!(ranking.summary.events_counted, 2);
        assert_eq!(
            ranking.contracts,
            vec![RankedContract { rank: 1, contract: "SP1.a".into(), calls: 2 }]
        );
        assert_eq!(feed.requested(), vec![0]);
    }

    #[tokio::test]
    async fn event_exactly_at_cutoff_is_counted() {
        let at_cutoff = call("SP1.edge", TimeDelta::days(90).num_seconds());
        let feed = PagedFeed::new(2, vec![vec![at_cutoff, old_call("SP1.edge")]]);

        let ranking = aggregate(&feed, &params(2, 1), now()).await;

        assert_eq!(ranking.contracts.len(), 1);
        assert_eq!(ranking.contracts[0].calls, 1);
    }

    #[tokio::test]
    async fn unreachable_feed_yields_empty_ranking() {
        let feed = PagedFeed::new(50, Vec::new());

        let ranking = aggregate(&feed, &params(50, 5), now()).await;

        assert!(ranking.contracts.is_empty());
        assert_eq!(ranking.summary.pages_fetched, 1);
        assert_eq!(ranking.summary.stop_reason, StopReason::EmptyPage);
    }

    #[tokio::test]
    async fn page_limit_caps_pagination() {
        let pages = (0..5).map(|_| vec![call("SP1.a", 1), call("SP1.b", 2)]).collect();
        let feed = PagedFeed::new(2, pages);
        let mut params = params(2, 1);
        params.max_pages = Some(2);

        let ranking = aggregate(&feed, &params, now()).await;

        assert_eq!(ranking.summary.stop_reason, StopReason::PageLimit);
        assert_eq!(feed.requested(), vec![0, 2]);
        assert_eq!(ranking.contracts[0].calls, 2);
    }

    #[tokio::test]
    async fn non_call_page_does_not_end_pagination() {
        let feed = NonCallFeed {
            pages: 2,
            tail: vec![call("SP1.a", 10)],
            requested: Mutex::new(Vec::new()),
        };

        let ranking = aggregate(&feed, &params(3, 1), now()).await;

        assert_eq!(*feed.requested.lock().unwrap(), vec![0, 3, 6, 9]);
        assert_eq!(ranking.summary.stop_reason, StopReason::EmptyPage);
        assert_eq!(ranking.summary.events_counted, 1);
        assert_eq!(ranking.contracts[0].contract, "SP1.a");
    }

    #[tokio::test]
    async fn oversized_lookback_counts_everything() {
        let config = FeedConfig {
            lookback_days: u32::MAX,
            ..FeedConfig::default()
        };
        let mut params = RankingParams::from(&config);
        params.min_calls = 1;
        let ancient = CallRecord::new("SP1.old", 0);
        let feed = PagedFeed::new(50, vec![vec![call("SP1.new", 1), ancient]]);

        let ranking = aggregate(&feed, &params, now()).await;

        assert_eq!(ranking.summary.events_counted, 2);
        assert_eq!(ranking.summary.stop_reason, StopReason::EmptyPage);
    }

    #[tokio::test]
    async fn zero_page_size_still_advances() {
        let feed = EndlessFeed {
            requested: Mutex::new(Vec::new()),
        };
        let mut params = params(0, 1);
        params.max_pages = Some(3);

        let ranking = aggregate(&feed, &params, now()).await;

        assert_eq!(ranking.summary.stop_reason, StopReason::PageLimit);
        assert_eq!(*feed.requested.lock().unwrap(), vec![(0, 1), (1, 1), (2, 1)]);
        assert_eq!(ranking.contracts[0].calls, 3);
    }

    #[test]
    fn params_from_feed_config() {
        let params = RankingParams::from(&FeedConfig::default());
        assert_eq!(params.page_size, 50);
        assert_eq!(params.lookback, TimeDelta::days(90));
        assert_eq!(params.min_calls, 5);
        assert!(params.max_pages.is_none());

        let capped = FeedConfig {
            max_pages: Some(7),
            ..FeedConfig::default()
        };
        assert_eq!(RankingParams::from(&capped).max_pages, Some(7));
    }
}

//! End-to-end stages: `rank` (feed → ranked dataset) and `analyze`
//! (ranked dataset → cost estimate → grace window → enrichment).

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, instrument};

use contractscope_harvest::{CallFeed, HiroClient, Ranking, RankingParams, SourceStore, aggregate};
use contractscope_shared::{AppConfig, RankedContract, Result};

use crate::checkpoint::{CheckpointStore, read_json, write_json};
use crate::cost::{self, CostEstimate, grace_window, rates_for};
use crate::engine::{AnalysisEngine, OpenAiEngine};
use crate::enrichment::{self, EnrichmentOptions, EnrichmentProgress, EnrichmentReport, SkipEvent};

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for pipeline stages.
pub trait ProgressReporter: EnrichmentProgress {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called once the cost estimate is known, or known to be unavailable.
    fn cost_estimate(&self, estimate: Option<&CostEstimate>);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl EnrichmentProgress for SilentProgress {
    fn item_started(&self, _current: usize, _total: usize, _contract: &str) {}
    fn item_saved(&self, _current: usize, _total: usize, _contract: &str) {}
    fn item_skipped(&self, _skip: &SkipEvent) {}
    fn done(&self, _report: &EnrichmentReport) {}
}

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn cost_estimate(&self, _estimate: Option<&CostEstimate>) {}
}

// ---------------------------------------------------------------------------
// Rank
// ---------------------------------------------------------------------------

/// Aggregate the call feed and write the ranked dataset to `out`.
#[instrument(skip_all, fields(out = %out.display(), lookback = %params.lookback, min_calls = params.min_calls))]
pub async fn rank_contracts<F: CallFeed>(
    feed: &F,
    params: &RankingParams,
    out: &Path,
) -> Result<Ranking> {
    let start = Instant::now();
    let ranking = aggregate(feed, params, Utc::now()).await;

    write_json(out, &ranking.contracts)?;

    info!(
        ranked = ranking.contracts.len(),
        pages = ranking.summary.pages_fetched,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "ranked dataset written"
    );
    Ok(ranking)
}

/// Read a ranked dataset written by [`rank_contracts`].
pub fn load_ranked(path: &Path) -> Result<Vec<RankedContract>> {
    read_json(path)
}

// ---------------------------------------------------------------------------
// Analyze
// ---------------------------------------------------------------------------

/// Configuration for the `analyze` stage.
#[derive(Debug, Clone)]
pub struct AnalyzeConfig {
    pub ranked_path: PathBuf,
    pub analyses_path: PathBuf,
    pub model: String,
    pub assumed_output_tokens: u64,
    pub enrichment: EnrichmentOptions,
    /// Abort window before any analysis is paid for. Zero skips it.
    pub grace_period: Duration,
}

impl AnalyzeConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            ranked_path: config.output.ranked_path.clone(),
            analyses_path: config.output.analyses_path.clone(),
            model: config.analysis.model.clone(),
            assumed_output_tokens: config.analysis.assumed_output_tokens,
            enrichment: EnrichmentOptions::from(&config.enrichment),
            grace_period: config.enrichment.grace_period(),
        }
    }
}

/// Run the `analyze` stage against the live Hiro and OpenAI endpoints.
///
/// The analysis key is checked before anything touches the network.
pub async fn analyze_contracts<P: ProgressReporter>(
    app_config: &AppConfig,
    config: &AnalyzeConfig,
    progress: &P,
) -> Result<EnrichmentReport> {
    let engine = OpenAiEngine::from_config(app_config)?;
    let sources = HiroClient::from_config(app_config)?;
    analyze_with(&sources, &engine, config, progress).await
}

/// Run the `analyze` stage with explicit collaborators.
#[instrument(skip_all, fields(ranked = %config.ranked_path.display(), out = %config.analyses_path.display()))]
pub async fn analyze_with<S, E, P>(
    sources: &S,
    engine: &E,
    config: &AnalyzeConfig,
    progress: &P,
) -> Result<EnrichmentReport>
where
    S: SourceStore,
    E: AnalysisEngine,
    P: ProgressReporter,
{
    progress.phase("Loading ranked contracts");
    let ranked = load_ranked(&config.ranked_path)?;

    progress.phase("Estimating cost");
    let estimate = estimate_cost(sources, &ranked, config).await;
    progress.cost_estimate(estimate.as_ref());

    if !config.grace_period.is_zero() {
        progress.phase("Waiting before start");
    }
    grace_window(config.grace_period).await;

    progress.phase("Analyzing contracts");
    let store = CheckpointStore::new(&config.analyses_path);
    enrichment::enrich(&ranked, sources, engine, &store, &config.enrichment, progress).await
}

/// Project the run's cost from the first ranked contract.
///
/// Returns `None` (and logs why) when no estimate can be made.
pub async fn estimate_cost<S: SourceStore>(
    sources: &S,
    ranked: &[RankedContract],
    config: &AnalyzeConfig,
) -> Option<CostEstimate> {
    let Some(first) = ranked.first() else {
        cost::report_unavailable("no ranked contracts");
        return None;
    };
    let Some(rates) = rates_for(&config.model) else {
        cost::report_unavailable(&format!("no rates known for model {}", config.model));
        return None;
    };

    let source = match sources.fetch_source(&first.contract).await {
        Ok(source) => source,
        Err(e) => {
            cost::report_unavailable(&e.to_string());
            return None;
        }
    };

    let item_count = config.enrichment.max_items.min(ranked.len());
    let estimate = CostEstimate::project(
        &first.contract,
        &source,
        rates,
        config.assumed_output_tokens,
        item_count,
    );

    info!(
        item_count,
        tokens_per_item = estimate.tokens_per_item,
        total_usd = estimate.total,
        "cost estimate"
    );
    Some(estimate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use contractscope_shared::{Analysis, CallRecord, ContractScopeError, FeedConfig};
    use contractscope_harvest::FeedPage;

    struct MapSources(HashMap<String, String>);

    impl SourceStore for MapSources {
        async fn fetch_source(&self, contract_id: &str) -> Result<String> {
            self.0
                .get(contract_id)
                .cloned()
                .ok_or_else(|| ContractScopeError::source_unavailable(contract_id, "not found"))
        }
    }

    struct EchoEngine;

    impl AnalysisEngine for EchoEngine {
        async fn analyze(&self, source: &str) -> Result<Analysis> {
            Ok(Analysis {
                summary: source.to_string(),
                explanation: "<L1>".into(),
                tags: vec!["utility".into()],
            })
        }
    }

    /// Serves one page of fresh events, then nothing.
    struct OnePageFeed(Vec<CallRecord>);

    impl CallFeed for OnePageFeed {
        async fn fetch_page(&self, offset: u64, _limit: u32) -> FeedPage {
            if offset == 0 {
                FeedPage::from_records(self.0.clone())
            } else {
                FeedPage::default()
            }
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        phases: Mutex<Vec<String>>,
        estimate: Mutex<Option<Option<f64>>>,
    }

    impl EnrichmentProgress for RecordingProgress {
        fn item_started(&self, _current: usize, _total: usize, _contract: &str) {}
        fn item_saved(&self, _current: usize, _total: usize, _contract: &str) {}
        fn item_skipped(&self, _skip: &SkipEvent) {}
        fn done(&self, _report: &EnrichmentReport) {}
    }

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, name: &str) {
            self.phases.lock().unwrap().push(name.to_string());
        }

        fn cost_estimate(&self, estimate: Option<&CostEstimate>) {
            *self.estimate.lock().unwrap() = Some(estimate.map(|e| e.total));
        }
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cs-pipeline-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn analyze_config(dir: &Path) -> AnalyzeConfig {
        AnalyzeConfig {
            ranked_path: dir.join("popular_contracts.json"),
            analyses_path: dir.join("contract_analyses.json"),
            model: "gpt-4-0125-preview".into(),
            assumed_output_tokens: 500,
            enrichment: EnrichmentOptions {
                max_items: 50,
                inter_item_delay: Duration::from_secs(1),
            },
            grace_period: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn rank_writes_ranked_dataset() {
        let dir = temp_dir();
        let now = Utc::now().timestamp();
        let feed = OnePageFeed(
            ["SP1.a", "SP1.b", "SP1.a", "SP1.a", "SP1.b", "SP1.c"]
                .into_iter()
                .map(|id| CallRecord::new(id, now - 60))
                .collect(),
        );
        let params = RankingParams {
            min_calls: 2,
            ..RankingParams::from(&FeedConfig::default())
        };
        let out = dir.join("nested").join("popular_contracts.json");

        let ranking = rank_contracts(&feed, &params, &out).await.unwrap();

        let written = load_ranked(&out).unwrap();
        assert_eq!(written, ranking.contracts);
        assert_eq!(
            written,
            vec![
                RankedContract { rank: 1, contract: "SP1.a".into(), calls: 3 },
                RankedContract { rank: 2, contract: "SP1.b".into(), calls: 2 },
            ]
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn analyze_estimates_waits_then_enriches() {
        let dir = temp_dir();
        let config = analyze_config(&dir);
        let ranked = vec![
            RankedContract { rank: 1, contract: "SP1.a".into(), calls: 9 },
            RankedContract { rank: 2, contract: "SP1.b".into(), calls: 4 },
        ];
        write_json(&config.ranked_path, &ranked).unwrap();

        let sources = MapSources(HashMap::from([
            ("SP1.a".to_string(), "x".repeat(4000)),
            ("SP1.b".to_string(), "(b)".to_string()),
        ]));
        let progress = RecordingProgress::default();

        let start = tokio::time::Instant::now();
        let report = analyze_with(&sources, &EchoEngine, &config, &progress).await.unwrap();

        assert_eq!(report.analyzed, 2);
        // 5s grace window plus 1s after each of the two saves.
        assert_eq!(start.elapsed(), Duration::from_secs(7));

        // 1000 tokens * $0.01/1k + 500 * $0.03/1k = $0.025, times two contracts.
        let total = progress.estimate.lock().unwrap().unwrap().unwrap();
        assert!((total - 0.05).abs() < 1e-9);
        assert_eq!(
            *progress.phases.lock().unwrap(),
            vec![
                "Loading ranked contracts",
                "Estimating cost",
                "Waiting before start",
                "Analyzing contracts",
            ]
        );

        let on_disk = CheckpointStore::new(&config.analyses_path).load().unwrap();
        assert_eq!(on_disk.len(), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_estimate_still_runs() {
        let dir = temp_dir();
        let mut config = analyze_config(&dir);
        config.model = "some-unknown-model".into();
        config.grace_period = Duration::ZERO;
        write_json(
            &config.ranked_path,
            &[RankedContract { rank: 1, contract: "SP1.a".into(), calls: 9 }],
        )
        .unwrap();

        let sources = MapSources(HashMap::from([("SP1.a".to_string(), "(a)".to_string())]));
        let progress = RecordingProgress::default();

        let report = analyze_with(&sources, &EchoEngine, &config, &progress).await.unwrap();

        assert_eq!(report.analyzed, 1);
        assert_eq!(*progress.estimate.lock().unwrap(), Some(None));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_ranking_has_no_estimate_and_no_work() {
        let dir = temp_dir();
        let config = analyze_config(&dir);
        write_json(&config.ranked_path, &Vec::<RankedContract>::new()).unwrap();

        let progress = RecordingProgress::default();
        let report = analyze_with(&MapSources(HashMap::new()), &EchoEngine, &config, &progress)
            .await
            .unwrap();

        assert_eq!(report.attempted, 0);
        assert_eq!(*progress.estimate.lock().unwrap(), Some(None));
        assert!(!config.analyses_path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_ranked_file_is_an_error() {
        let dir = temp_dir();
        let config = analyze_config(&dir);
        let sources = MapSources(HashMap::new());

        let err = analyze_with(&sources, &EchoEngine, &config, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, ContractScopeError::Io { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_analysis_key_fails_before_any_request() {
        let mut app_config = AppConfig::default();
        app_config.analysis.api_key_env = "CONTRACTSCOPE_TEST_UNSET_KEY".into();
        // Unreachable endpoints: any request would fail differently.
        app_config.feed.base_url = "http://127.0.0.1:9".into();
        app_config.analysis.base_url = "http://127.0.0.1:9".into();

        let config = AnalyzeConfig::from_app_config(&app_config);
        let err = analyze_contracts(&app_config, &config, &SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, ContractScopeError::Config { .. }));
        assert!(err.to_string().contains("CONTRACTSCOPE_TEST_UNSET_KEY"));
    }
}

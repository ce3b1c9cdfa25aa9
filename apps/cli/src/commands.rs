//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use contractscope_annotate::{
    AnnotationSegment, HighlightCommand, HighlightLinker, SegmentKind, TextView, parse,
};
use contractscope_core::pipeline::{self, AnalyzeConfig, ProgressReporter};
use contractscope_core::{
    CheckpointStore, CostEstimate, EnrichmentProgress, EnrichmentReport, SkipEvent, SkipReason,
};
use contractscope_harvest::{HiroClient, RankingParams};
use contractscope_shared::{AnalysisRecord, AppConfig, FeedConfig, init_config, load_config};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// contractscope: rank popular Clarity contracts and explain them.
#[derive(Parser)]
#[command(
    name = "contractscope",
    version,
    about = "Rank the most-called Stacks contracts and generate annotated explanations.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Rank contracts by calls over the lookback window.
    Rank {
        /// Ranked dataset to write (defaults to [output].ranked_path).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Days of history to count.
        #[arg(long)]
        lookback_days: Option<u32>,

        /// Minimum calls for a contract to be ranked.
        #[arg(long)]
        min_calls: Option<u64>,

        /// Stop after this many feed pages.
        #[arg(long)]
        max_pages: Option<u64>,
    },

    /// Analyze the top ranked contracts.
    Analyze {
        /// Ranked dataset to read (defaults to [output].ranked_path).
        #[arg(long)]
        ranked: Option<PathBuf>,

        /// Analysis dataset to write (defaults to [output].analyses_path).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Maximum number of contracts to analyze.
        #[arg(short, long)]
        limit: Option<usize>,

        /// Start immediately, skipping the cancel window after the estimate.
        #[arg(short, long)]
        yes: bool,
    },

    /// Rank, then analyze, with configured defaults.
    Run,

    /// Show an analyzed contract's explanation.
    Explain {
        /// Contract id (`<address>.<name>`).
        #[arg(short, long)]
        contract: String,

        /// Analysis dataset to read (defaults to [output].analyses_path).
        #[arg(long)]
        dataset: Option<PathBuf>,

        /// Highlight the N-th line reference (1-based) in the source.
        #[arg(short, long)]
        line: Option<usize>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "contractscope=info",
        1 => "contractscope=debug",
        _ => "contractscope=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Rank {
            out,
            lookback_days,
            min_calls,
            max_pages,
        } => cmd_rank(out, lookback_days, min_calls, max_pages).await,
        Command::Analyze {
            ranked,
            out,
            limit,
            yes,
        } => cmd_analyze(ranked, out, limit, yes).await,
        Command::Run => cmd_run().await,
        Command::Explain {
            contract,
            dataset,
            line,
        } => cmd_explain(&contract, dataset, line),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// rank / analyze / run
// ---------------------------------------------------------------------------

async fn cmd_rank(
    out: Option<PathBuf>,
    lookback_days: Option<u32>,
    min_calls: Option<u64>,
    max_pages: Option<u64>,
) -> Result<()> {
    let mut config = load_config()?;
    apply_feed_overrides(&mut config.feed, lookback_days, min_calls, max_pages)?;
    let out = out.unwrap_or_else(|| config.output.ranked_path.clone());

    rank(&config, &out).await
}

/// Layer `rank` flags over the `[feed]` section and re-check the result.
fn apply_feed_overrides(
    feed: &mut FeedConfig,
    lookback_days: Option<u32>,
    min_calls: Option<u64>,
    max_pages: Option<u64>,
) -> Result<()> {
    if let Some(days) = lookback_days {
        feed.lookback_days = days;
    }
    if let Some(min) = min_calls {
        feed.min_calls = min;
    }
    if max_pages.is_some() {
        feed.max_pages = max_pages;
    }
    feed.validate()?;
    Ok(())
}

async fn rank(config: &AppConfig, out: &Path) -> Result<()> {
    let feed = HiroClient::from_config(config)?;
    let params = RankingParams::from(&config.feed);

    info!(
        lookback_days = config.feed.lookback_days,
        min_calls = config.feed.min_calls,
        "ranking contracts"
    );

    let spinner = spinner("Fetching contract calls");
    let ranking = pipeline::rank_contracts(&feed, &params, out).await;
    spinner.finish_and_clear();
    let ranking = ranking?;

    println!();
    println!("  Ranked {} contracts", ranking.contracts.len());
    println!("  Pages:     {}", ranking.summary.pages_fetched);
    println!("  Calls:     {}", ranking.summary.events_counted);
    println!("  Distinct:  {}", ranking.summary.distinct_contracts);
    println!("  Path:      {}", out.display());
    println!();

    Ok(())
}

async fn cmd_analyze(
    ranked: Option<PathBuf>,
    out: Option<PathBuf>,
    limit: Option<usize>,
    yes: bool,
) -> Result<()> {
    let config = load_config()?;
    let mut analyze = AnalyzeConfig::from_app_config(&config);
    if let Some(ranked) = ranked {
        analyze.ranked_path = ranked;
    }
    if let Some(out) = out {
        analyze.analyses_path = out;
    }
    if let Some(limit) = limit {
        analyze.enrichment.max_items = limit;
    }
    if yes {
        analyze.grace_period = std::time::Duration::ZERO;
    }

    analyze_run(&config, &analyze).await
}

async fn analyze_run(config: &AppConfig, analyze: &AnalyzeConfig) -> Result<()> {
    let reporter = CliProgress::new();
    let report = pipeline::analyze_contracts(config, analyze, &reporter).await;
    reporter.spinner.finish_and_clear();
    let report = report?;

    println!();
    println!("  Analysis complete!");
    println!("  Attempted: {}", report.attempted);
    println!("  Analyzed:  {}", report.analyzed);
    println!("  Skipped:   {}", report.skips.len());
    for skip in &report.skips {
        let reason = match &skip.reason {
            SkipReason::SourceUnavailable(e) => format!("source unavailable ({e})"),
            SkipReason::AnalysisFailed(e) => format!("analysis failed ({e})"),
        };
        println!("    #{} {}: {reason}", skip.rank, skip.contract);
    }
    println!("  Path:      {}", analyze.analyses_path.display());
    println!();

    Ok(())
}

async fn cmd_run() -> Result<()> {
    let config = load_config()?;
    // Fail on a missing analysis key before spending time on the feed.
    contractscope_shared::validate_api_key(&config)?;

    let analyze = AnalyzeConfig::from_app_config(&config);
    rank(&config, &analyze.ranked_path).await?;
    analyze_run(&config, &analyze).await
}

// ---------------------------------------------------------------------------
// explain
// ---------------------------------------------------------------------------

fn cmd_explain(contract: &str, dataset: Option<PathBuf>, line: Option<usize>) -> Result<()> {
    let dataset = match dataset {
        Some(path) => path,
        None => load_config()?.output.analyses_path,
    };

    let records = CheckpointStore::new(&dataset).load()?;
    let record = records
        .iter()
        .find(|r| r.contract == contract)
        .ok_or_else(|| eyre!("'{contract}' not found in {}", dataset.display()))?;

    let segments = parse(&record.analysis.explanation);
    print_record(record, &segments);

    if let Some(n) = line {
        let command = segments
            .iter()
            .filter_map(|s| HighlightCommand::for_segment(&s.kind))
            .nth(n.saturating_sub(1))
            .filter(|_| n > 0)
            .ok_or_else(|| eyre!("the explanation has no line reference #{n}"))?;

        let mut linker = HighlightLinker::new(TextView::new(&record.source));
        linker.apply(command);
        println!("{}", linker.editor().render_viewport());
    }

    Ok(())
}

fn print_record(record: &AnalysisRecord, segments: &[AnnotationSegment]) {
    println!();
    println!("  #{} {} ({} calls)", record.rank, record.contract, record.calls);
    println!("  Tags: {}", record.analysis.tags.join(", "));
    println!();
    println!("  {}", record.analysis.summary);
    println!();
    println!("{}", render_segments(segments));
    println!();
}

/// Render segments for the terminal, numbering line references for `--line`.
fn render_segments(segments: &[AnnotationSegment]) -> String {
    let mut out = String::new();
    let mut refs = 0;

    for segment in segments {
        match &segment.kind {
            SegmentKind::Text(text) => out.push_str(text),
            SegmentKind::Code(code) => {
                out.push('`');
                out.push_str(code);
                out.push('`');
            }
            SegmentKind::Bold(text) => out.push_str(&text.to_uppercase()),
            SegmentKind::LineRef(range) => {
                refs += 1;
                out.push_str(&format!("[{range} #{refs}]"));
            }
        }
    }

    out
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(
            style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
    }
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner.set_message(message.to_string());
    spinner
}

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        Self {
            spinner: spinner("Starting"),
        }
    }
}

impl EnrichmentProgress for CliProgress {
    fn item_started(&self, current: usize, total: usize, contract: &str) {
        self.spinner
            .set_message(format!("Analyzing [{current}/{total}] {contract}"));
    }

    fn item_saved(&self, current: usize, total: usize, contract: &str) {
        self.spinner
            .println(format!("  saved [{current}/{total}] {contract}"));
    }

    fn item_skipped(&self, skip: &SkipEvent) {
        self.spinner
            .println(format!("  skipped #{} {}", skip.rank, skip.contract));
    }

    fn done(&self, _report: &EnrichmentReport) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn cost_estimate(&self, estimate: Option<&CostEstimate>) {
        let text = match estimate {
            Some(estimate) => format!("\n{estimate}\n"),
            None => "\nEstimate unavailable\n".to_string(),
        };
        self.spinner.println(text);
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

//! Movemark CLI: detect and annotate notable price moves, manage the cache.
//!
//! Commands:
//! - `annotate`: load prices, detect moves, and explain each one
//! - `cache status`: report entry counts and sizes per kind
//! - `cache clear`: drop cached entries for a ticker, a kind, or everything

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use movemark_core::annotate::{Annotator, ChatConfig, ChatSummarizer, YahooNews};
use movemark_core::cache::{CacheKind, CacheStore, KindStats};
use movemark_core::data::{
    CircuitBreaker, CsvProvider, PriceProvider, SyntheticProvider, YahooClient, YahooProvider,
};
use movemark_runner::{AnnotatedChart, Pipeline, PipelineOptions, StderrObserver};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable holding the summarizer API key.
const SUMMARIZER_KEY_VAR: &str = "MOVEMARK_SUMMARIZER_KEY";

#[derive(Parser)]
#[command(
    name = "movemark",
    version,
    about = "Movemark: find notable price moves and explain them"
)]
struct Cli {
    /// Cache directory. Defaults to the platform cache dir.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect notable moves for a ticker and annotate them.
    Annotate(AnnotateArgs),
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(clap::Args)]
struct AnnotateArgs {
    /// Ticker symbol (e.g., AAPL). Optional when --config names one.
    ticker: Option<String>,

    /// TOML options file; flags given here override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start date (YYYY-MM-DD). Defaults to one year before --end.
    #[arg(long)]
    start: Option<String>,

    /// End date (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    end: Option<String>,

    /// Minimum move size in percent.
    #[arg(long)]
    min_pct: Option<f64>,

    /// Keep at most this many moves.
    #[arg(long, conflicts_with = "all_moves")]
    top_n: Option<usize>,

    /// Keep every move above the threshold.
    #[arg(long, default_value_t = false)]
    all_moves: bool,

    /// Company name for news queries (e.g., "Apple").
    #[arg(long)]
    name: Option<String>,

    /// Skip news and summaries; label moves with date and percent only.
    #[arg(long, default_value_t = false)]
    no_annotations: bool,

    /// Drop cached prices and annotations for the ticker first.
    #[arg(long, default_value_t = false)]
    clear_cache: bool,

    /// Concurrent annotation lookups.
    #[arg(long)]
    workers: Option<usize>,

    /// Timeout for each news or summarizer call, in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Read prices from this CSV file instead of Yahoo Finance.
    #[arg(long, conflicts_with = "synthetic")]
    csv: Option<PathBuf>,

    /// Use generated prices (offline development only).
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// OpenAI-compatible chat completions endpoint.
    #[arg(long)]
    summarizer_url: Option<String>,

    /// Summarizer model name.
    #[arg(long)]
    model: Option<String>,

    /// Write the chart hand-off JSON here.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report entry counts and sizes per kind.
    Status,
    /// Remove cached entries.
    Clear {
        /// Only this ticker (both kinds).
        #[arg(long, conflicts_with = "kind")]
        ticker: Option<String>,

        /// Only this kind.
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Prices,
    Annotations,
}

impl From<KindArg> for CacheKind {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::Prices => CacheKind::Prices,
            KindArg::Annotations => CacheKind::Annotations,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cache_dir = cli.cache_dir.unwrap_or_else(default_cache_dir);

    match cli.command {
        Commands::Annotate(args) => run_annotate(args, &cache_dir),
        Commands::Cache { action } => match action {
            CacheAction::Status => run_cache_status(&cache_dir),
            CacheAction::Clear { ticker, kind } => run_cache_clear(&cache_dir, ticker, kind),
        },
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join("movemark"))
        .unwrap_or_else(|| PathBuf::from(".movemark-cache"))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
}

fn build_options(args: &AnnotateArgs) -> Result<PipelineOptions> {
    let end = args.end.as_deref().map(parse_date).transpose()?;
    let start = args.start.as_deref().map(parse_date).transpose()?;

    let mut opts = match &args.config {
        Some(path) => PipelineOptions::from_file(path)?,
        None => {
            let Some(ticker) = &args.ticker else {
                bail!("a ticker is required (or pass --config)");
            };
            let end = end.unwrap_or_else(|| chrono::Local::now().date_naive());
            let start = start.unwrap_or(end - chrono::Duration::days(365));
            PipelineOptions::new(ticker.to_uppercase(), start, end)
        }
    };

    if let Some(ticker) = &args.ticker {
        opts.ticker = ticker.to_uppercase();
    }
    if let Some(start) = start {
        opts.start = start;
    }
    if let Some(end) = end {
        opts.end = end;
    }
    if let Some(min_pct) = args.min_pct {
        opts.min_pct = min_pct;
    }
    if args.all_moves {
        opts.top_n = None;
    } else if let Some(n) = args.top_n {
        opts.top_n = Some(n);
    }
    if let Some(name) = &args.name {
        opts.display_name = Some(name.clone());
    }
    if args.no_annotations {
        opts.annotate = false;
    }
    if args.clear_cache {
        opts.clear_cache = true;
    }
    if let Some(workers) = args.workers {
        opts.workers = workers;
    }
    if let Some(ms) = args.timeout_ms {
        opts.call_timeout_ms = ms;
    }

    opts.validate()?;
    Ok(opts)
}

fn build_summarizer(args: &AnnotateArgs, opts: &PipelineOptions) -> Result<Option<ChatSummarizer>> {
    let api_key = std::env::var(SUMMARIZER_KEY_VAR).ok().filter(|k| !k.is_empty());
    if api_key.is_none() && args.summarizer_url.is_none() {
        tracing::info!("no {SUMMARIZER_KEY_VAR} or --summarizer-url; using raw headlines");
        return Ok(None);
    }

    let defaults = ChatConfig::default();
    let config = ChatConfig {
        endpoint: args.summarizer_url.clone().unwrap_or(defaults.endpoint),
        api_key,
        model: args.model.clone().unwrap_or(defaults.model),
        timeout: opts.call_timeout(),
        ..defaults
    };
    Ok(Some(
        ChatSummarizer::new(config).context("failed to build summarizer client")?,
    ))
}

fn run_annotate(args: AnnotateArgs, cache_dir: &Path) -> Result<()> {
    let opts = build_options(&args)?;

    let circuit_breaker = Arc::new(CircuitBreaker::default_provider());
    let yahoo = YahooClient::new(circuit_breaker, opts.call_timeout())?;

    let provider: Box<dyn PriceProvider> = if let Some(path) = &args.csv {
        Box::new(CsvProvider::new(path))
    } else if args.synthetic {
        Box::new(SyntheticProvider)
    } else {
        Box::new(YahooProvider::new(yahoo.clone()))
    };
    if !provider.is_available() {
        bail!("price source '{}' is not available", provider.name());
    }

    let mut annotator = Annotator::new(Arc::new(YahooNews::new(yahoo)), opts.annotator_config());
    if let Some(summarizer) = build_summarizer(&args, &opts)? {
        annotator = annotator.with_summarizer(Arc::new(summarizer));
    }

    let cache = CacheStore::new(cache_dir);
    let observer = StderrObserver;
    let chart = Pipeline::new(&cache, provider.as_ref())
        .with_annotator(&annotator)
        .with_observer(&observer)
        .run(&opts)?;

    print_chart(&chart);

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&chart.handoff())?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Chart data saved to: {}", path.display());
    }

    Ok(())
}

fn print_chart(chart: &AnnotatedChart) {
    println!();
    println!(
        "{} ({}): {} sessions, {} to {}, prices from {:?}",
        chart.display_name,
        chart.ticker,
        chart.series.len(),
        chart.series.start(),
        chart.series.end(),
        chart.price_source
    );

    if chart.events.is_empty() {
        println!("No moves met the threshold.");
        return;
    }

    println!();
    println!(
        "{:<12} {:<12} {:>8} {:>5}  {}",
        "Start", "End", "Change", "Days", "Annotation"
    );
    println!("{}", "-".repeat(72));
    for event in chart.chronological() {
        println!(
            "{:<12} {:<12} {:>+7.1}% {:>5}  {}",
            event.mv.start_date.to_string(),
            event.mv.end_date.to_string(),
            event.mv.pct_change,
            event.mv.sessions,
            event.annotation.summary
        );
    }

    if !chart.notes.is_empty() {
        println!();
        println!("Notes:");
        for note in &chart.notes {
            println!("  {note}");
        }
    }
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let stats = CacheStore::new(cache_dir).status()?;

    println!("Cache: {}", cache_dir.display());
    println!();
    println!(
        "{:<12} {:>8} {:>8} {:>10} {:>12}",
        "Kind", "Entries", "Tickers", "Size", "Quarantined"
    );
    println!("{}", "-".repeat(54));
    for kind in CacheKind::ALL {
        let KindStats {
            entries,
            tickers,
            bytes,
            quarantined,
        } = stats.kind(kind);
        println!(
            "{:<12} {:>8} {:>8} {:>10} {:>12}",
            kind.as_str(),
            entries,
            tickers,
            format_size(*bytes),
            quarantined
        );
    }

    Ok(())
}

fn run_cache_clear(cache_dir: &Path, ticker: Option<String>, kind: Option<KindArg>) -> Result<()> {
    let cache = CacheStore::new(cache_dir);

    let removed = match (ticker, kind) {
        (Some(ticker), _) => cache.invalidate_ticker(&ticker.to_uppercase())?,
        (None, Some(kind)) => cache.invalidate_kind(kind.into())?,
        (None, None) => cache.invalidate_all()?,
    };

    println!("Removed {removed} cached entries from {}", cache_dir.display());
    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.1} GB", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

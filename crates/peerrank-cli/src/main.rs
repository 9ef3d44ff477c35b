//! PeerRank validator CLI
//!
//! The `peerrank` command drives the review reward pipeline.
//!
//! ## Commands
//!
//! - `run`: dispatch, score, rank and reward epochs on a fixed interval
//! - `ledger show`: print the persisted participant scores and weights
//! - `ledger reset`: discard the persisted ledger
//! - `dataset summary`: check a preprocessed review dataset

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn, Level};

use peerrank_core::{
    load_catalog, summarize, DatasetParticipantClient, EpochScheduler, FsScoreCache,
    JsonFileWeightPublisher, LedgerConfig, MemoryScoreCache, PipelineDeps, ScoreCache,
    ScoreLedger, TracingPublisher, ValidatorConfig, WeightPublisher,
};
use peerrank_evaluator::{EvaluatorConfig, OpenAiEvaluator, DEFAULT_BASE_URL, DEFAULT_MODEL};
use peerrank_state::{FileLedgerStore, LedgerSnapshot, LedgerStore};

const DEFAULT_LEDGER: &str = "peerrank-ledger.json";

#[derive(Parser)]
#[command(name = "peerrank")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Validator reward pipeline for peer-review submissions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the epoch scheduler until Ctrl-C (or --max-epochs)
    Run(RunArgs),

    /// Inspect or reset the participant score ledger
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },

    /// Preprocessed dataset tools
    Dataset {
        #[command(subcommand)]
        action: DatasetAction,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Preprocessed dataset directory (paper_metadata.json, miner_<n>_reviews.json)
    #[arg(long, env = "PEERRANK_DATASET")]
    dataset: PathBuf,

    /// Ledger file
    #[arg(long, env = "PEERRANK_LEDGER", default_value = DEFAULT_LEDGER)]
    ledger: PathBuf,

    /// TOML config file; flags below override it
    #[arg(short, long, env = "PEERRANK_CONFIG")]
    config: Option<PathBuf>,

    /// Participants sampled per epoch
    #[arg(long)]
    sample_size: Option<usize>,

    /// Seconds between epoch starts
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Stop after this many epochs
    #[arg(long)]
    max_epochs: Option<u64>,

    /// Seed for participant sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Evaluator model name
    #[arg(long, env = "PEERRANK_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    evaluator_url: String,

    /// Evaluator API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// The evaluator endpoint needs no API key
    #[arg(long)]
    no_auth: bool,

    /// Persist evaluator scores here across restarts (default: in memory)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Write published weights to this JSON file (default: log them)
    #[arg(long)]
    weights_out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum LedgerAction {
    /// Print participant scores and normalized weights
    Show {
        #[arg(long, env = "PEERRANK_LEDGER", default_value = DEFAULT_LEDGER)]
        ledger: PathBuf,

        /// Print the raw snapshot as JSON
        #[arg(long = "raw")]
        raw: bool,
    },
    /// Delete the ledger; the next run starts every participant from zero
    Reset {
        #[arg(long, env = "PEERRANK_LEDGER", default_value = DEFAULT_LEDGER)]
        ledger: PathBuf,

        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum DatasetAction {
    /// Load and cross-check a dataset directory
    Summary {
        /// Dataset directory
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    peerrank_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Ledger { action } => match action {
            LedgerAction::Show { ledger, raw } => cmd_ledger_show(&ledger, raw).await,
            LedgerAction::Reset { ledger, yes } => cmd_ledger_reset(&ledger, yes).await,
        },
        Commands::Dataset { action } => match action {
            DatasetAction::Summary { dir } => cmd_dataset_summary(&dir),
        },
    }
}

/// Config file (or defaults) with command-line overrides applied.
fn build_config(args: &RunArgs) -> Result<ValidatorConfig> {
    let mut config = match &args.config {
        Some(path) => ValidatorConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ValidatorConfig::default(),
    };
    if let Some(n) = args.sample_size {
        config.dispatch.sample_size = n;
    }
    if let Some(secs) = args.interval_secs {
        config.schedule.interval_secs = secs;
    }
    if let Some(max) = args.max_epochs {
        config.schedule.max_epochs = Some(max);
    }
    if let Some(seed) = args.seed {
        config.dispatch.seed = Some(seed);
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn evaluator_config(args: &RunArgs) -> EvaluatorConfig {
    let mut config = EvaluatorConfig::new(&args.evaluator_url, &args.model);
    if let Some(key) = &args.api_key {
        config = config.with_api_key(key);
    }
    if args.no_auth {
        config = config.without_auth();
    }
    config
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let config = build_config(&args)?;
    let evaluator = OpenAiEvaluator::new(evaluator_config(&args))
        .context("Invalid evaluator configuration")?;

    let catalog = load_catalog(&args.dataset)
        .with_context(|| format!("Failed to load papers from {}", args.dataset.display()))?;
    let client = DatasetParticipantClient::load(&args.dataset)
        .with_context(|| format!("Failed to load reviews from {}", args.dataset.display()))?;
    if catalog.is_empty() {
        warn!(
            dataset = %args.dataset.display(),
            "paper catalog is empty; every submission will be dropped"
        );
    }

    let cache: Arc<dyn ScoreCache> = match &args.cache_dir {
        Some(dir) => Arc::new(
            FsScoreCache::new(dir)
                .with_context(|| format!("Failed to open score cache {}", dir.display()))?,
        ),
        None => Arc::new(MemoryScoreCache::new()),
    };
    let publisher: Arc<dyn WeightPublisher> = match &args.weights_out {
        Some(path) => Arc::new(JsonFileWeightPublisher::new(path)),
        None => Arc::new(TracingPublisher),
    };

    let deps = PipelineDeps {
        population: client.population(),
        participants: Arc::new(client),
        catalog: Arc::new(catalog),
        evaluator: Arc::new(evaluator),
        cache,
        store: Arc::new(FileLedgerStore::new(&args.ledger)),
        publisher,
    };

    let mut scheduler = EpochScheduler::open(config, deps).await.with_context(|| {
        format!(
            "Failed to open ledger {} (use `peerrank ledger reset --yes` to start over)",
            args.ledger.display()
        )
    })?;
    info!(
        next_epoch = scheduler.next_epoch(),
        participants = scheduler.ledger().len(),
        "validator ready"
    );

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested; finishing the current epoch");
            let _ = tx.send(true);
        }
    });

    let epochs = scheduler.run(rx).await?;
    println!("Ran {} epoch(s); ledger at {}", epochs, args.ledger.display());
    Ok(())
}

async fn cmd_ledger_show(path: &Path, raw: bool) -> Result<()> {
    let store = FileLedgerStore::new(path);
    let Some(snapshot) = store
        .load()
        .await
        .with_context(|| format!("Failed to read ledger {}", path.display()))?
    else {
        println!("No ledger at {}", path.display());
        return Ok(());
    };

    if raw {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print!("{}", render_ledger(&snapshot));
    }
    Ok(())
}

fn render_ledger(snapshot: &LedgerSnapshot) -> String {
    let weights = ScoreLedger::new(snapshot.clone(), LedgerConfig::default()).weights();
    let mut out = String::new();
    match snapshot.last_epoch {
        Some(epoch) => out.push_str(&format!("Last epoch: {epoch}\n")),
        None => out.push_str("Last epoch: none\n"),
    }
    out.push_str(&format!(
        "{:<24} {:>10} {:>8} {:>10} {:>10}\n",
        "PARTICIPANT", "EMA", "EPOCHS", "LAST", "WEIGHT"
    ));
    for (id, state) in &snapshot.participants {
        let weight = weights.get(id).copied().unwrap_or(0.0);
        out.push_str(&format!(
            "{:<24} {:>10.6} {:>8} {:>10} {:>10.6}\n",
            truncate(id.as_str(), 24),
            state.ema_score,
            state.epochs_observed,
            state.last_epoch,
            weight
        ));
    }
    out
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

async fn cmd_ledger_reset(path: &Path, yes: bool) -> Result<()> {
    if !yes {
        bail!(
            "Refusing to reset {} without --yes; all accumulated scores would be lost",
            path.display()
        );
    }
    FileLedgerStore::new(path)
        .reset()
        .await
        .with_context(|| format!("Failed to reset ledger {}", path.display()))?;
    println!("Ledger {} reset", path.display());
    Ok(())
}

fn cmd_dataset_summary(dir: &Path) -> Result<()> {
    let summary = summarize(dir)
        .with_context(|| format!("Failed to summarize dataset {}", dir.display()))?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    if summary.unknown_paper_reviews > 0 {
        warn!(
            count = summary.unknown_paper_reviews,
            "reviews reference papers missing from the catalog"
        );
    }
    Ok(())
}

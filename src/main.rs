//! # feedsift CLI (`sift`)
//!
//! The `sift` binary drives ingestion runs and inspects their results.
//!
//! ## Usage
//!
//! ```bash
//! sift --config ./config/sift.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sift init` | Create the SQLite database and schema |
//! | `sift sources` | List configured sources and their last consumption |
//! | `sift query add "<text>"` | Open a query |
//! | `sift query list [--open]` | List queries and their state |
//! | `sift sync [--source NAME]` | One run over all (or one) sources |
//! | `sift schedule` | Repeated runs until `--max-runs` or Ctrl-C |
//! | `sift results "<query>"` | Ranked items judged relevant to a query |
//! | `sift stats` | Store statistics |
//! | `sift cleanup --days D` | Remove items fetched more than D days ago |
//!
//! Logs go to stderr and honour `RUST_LOG` (default `info`).

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use feedsift::config;
use feedsift::migrate;
use feedsift::oracle::create_oracle;
use feedsift::pipeline::{Pipeline, PipelineOptions};
use feedsift::queries;
use feedsift::results;
use feedsift::scheduler::{CancelHandle, CancelToken, ScheduleOptions, Scheduler};
use feedsift::sources;
use feedsift::stats;
use feedsift::store::sqlite::SqliteStore;
use feedsift::store::ItemStore;

/// feedsift: feed ingestion with a relevance oracle.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/sift.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "sift",
    about = "feedsift: ingest feeds and resolve standing queries with a relevance oracle",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sift.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// List configured sources and when each was last consumed.
    Sources,

    /// Manage standing queries.
    Query {
        #[command(subcommand)]
        action: QueryAction,
    },

    /// Run the pipeline once over every enabled source.
    Sync {
        /// Only consume the source with this name.
        #[arg(long)]
        source: Option<String>,
    },

    /// Run the pipeline repeatedly. Ctrl-C stops at the next safe point.
    Schedule {
        /// Minutes between runs (overrides `schedule.interval_minutes`).
        #[arg(long)]
        interval: Option<u64>,

        /// Stop after this many runs (overrides `schedule.max_runs`).
        #[arg(long)]
        max_runs: Option<u32>,

        /// Skip retention cleanup after each run.
        #[arg(long)]
        no_cleanup: bool,
    },

    /// Show items judged relevant to a query, best first.
    Results {
        /// Query text, exactly as added.
        query: String,

        /// Inclusive score floor (defaults to `pipeline.min_relevance_score`).
        #[arg(long)]
        min_score: Option<u8>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Print store statistics.
    Stats,

    /// Remove items fetched more than `--days` ago, with their records.
    Cleanup {
        #[arg(long)]
        days: u32,
    },
}

#[derive(Subcommand)]
enum QueryAction {
    /// Open a new query. Adding existing text is a no-op.
    Add { text: String },

    /// List queries.
    List {
        /// Only show open queries.
        #[arg(long)]
        open: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            let store = SqliteStore::open(&cfg).await?;
            sources::list_sources(&cfg, &store).await?;
        }
        Commands::Query { action } => {
            let store = SqliteStore::open(&cfg).await?;
            match action {
                QueryAction::Add { text } => queries::add_query(&store, &text).await?,
                QueryAction::List { open } => queries::list_queries(&store, open).await?,
            }
        }
        Commands::Sync { source } => {
            let store = Arc::new(SqliteStore::open(&cfg).await?);
            let mut all = sources::build_sources(&cfg)?;
            if let Some(name) = source {
                all.retain(|s| s.name() == name);
                if all.is_empty() {
                    bail!("No enabled source named '{}'", name);
                }
            }
            let pipeline = build_pipeline(&cfg, store)?;
            let stats = pipeline.run(&all, &CancelToken::never()).await;
            println!("sync");
            stats.print();
            println!("ok");
        }
        Commands::Schedule {
            interval,
            max_runs,
            no_cleanup,
        } => {
            let mut options = ScheduleOptions::from(&cfg.schedule);
            if let Some(minutes) = interval {
                if minutes == 0 {
                    bail!("--interval must be > 0");
                }
                let secs = minutes
                    .checked_mul(60)
                    .ok_or_else(|| anyhow!("--interval {} is too large", minutes))?;
                options.interval = Duration::from_secs(secs);
            }
            if let Some(max) = max_runs {
                if max == 0 {
                    bail!("--max-runs must be >= 1");
                }
                options.max_runs = Some(max);
            }
            if no_cleanup {
                options.cleanup_enabled = false;
            }

            let store = Arc::new(SqliteStore::open(&cfg).await?);
            let pipeline = build_pipeline(&cfg, store)?;
            let scheduler = Scheduler::new(pipeline, sources::build_sources(&cfg)?, options);

            let handle = CancelHandle::new();
            let token = handle.token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received, stopping after the current step");
                    handle.cancel();
                }
            });

            let summary = scheduler
                .run(&token, |run, stats| {
                    println!("run {}", run);
                    stats.print();
                    println!();
                })
                .await;
            println!(
                "schedule stopped after {} run{}{}",
                summary.runs_completed,
                if summary.runs_completed == 1 { "" } else { "s" },
                if summary.cancelled { " (cancelled)" } else { "" }
            );
        }
        Commands::Results {
            query,
            min_score,
            limit,
        } => {
            let store = SqliteStore::open(&cfg).await?;
            let floor = min_score.unwrap_or(cfg.pipeline.min_relevance_score);
            if floor > 100 {
                bail!("--min-score must be in [0, 100]");
            }
            results::run_results(&store, &query, floor, limit).await?;
        }
        Commands::Stats => {
            let store = SqliteStore::open(&cfg).await?;
            stats::run_stats(&cfg, &store).await?;
        }
        Commands::Cleanup { days } => {
            if days == 0 {
                bail!("--days must be > 0");
            }
            let store = SqliteStore::open(&cfg).await?;
            let removed = store.cleanup_older_than(days).await?;
            println!("Removed {} item(s) older than {} days.", removed, days);
        }
    }

    Ok(())
}

fn build_pipeline(cfg: &config::Config, store: Arc<SqliteStore>) -> Result<Pipeline> {
    let oracle = create_oracle(&cfg.oracle)?;
    Ok(Pipeline::new(
        store.clone(),
        store,
        oracle,
        PipelineOptions::from(&cfg.pipeline),
    ))
}

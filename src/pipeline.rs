//! Pipeline orchestration: one run across all sources.
//!
//! For each source, sequentially:
//!
//! ```text
//! consume → upsert_source → store_items → list_open
//!         → for (item, query): evaluate → parse → store record → resolve
//!         → inter-source delay
//! ```
//!
//! Failures are contained at the smallest unit that can absorb them. A
//! failed fetch (or a store-wide failure while handling a source) marks that
//! source errored and the run moves on. A failed oracle call yields an
//! `Error` record for that pair. Nothing that has been committed is rolled
//! back, so stopping a run early is always safe.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{FetchError, OracleError};
use crate::models::{Item, Query};
use crate::oracle::RelevanceOracle;
use crate::parser::{error_record, is_match, parse_judgment};
use crate::scheduler::CancelToken;
use crate::sources::Source;
use crate::store::{ItemStore, QueryLedger};

/// Run parameters taken from `[pipeline]`.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub min_relevance_score: u8,
    pub content_max_chars: usize,
    pub source_delay: Duration,
    pub fetch_timeout: Duration,
    pub oracle_timeout: Duration,
}

impl From<&PipelineConfig> for PipelineOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            min_relevance_score: config.min_relevance_score,
            content_max_chars: config.content_max_chars,
            source_delay: config.source_delay(),
            fetch_timeout: config.fetch_timeout(),
            oracle_timeout: config.oracle_timeout(),
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

/// Outcome of one source within a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceRunStats {
    pub source: String,
    pub items_found: usize,
    pub items_stored: usize,
    pub judgments_produced: usize,
    pub judgments_stored: usize,
    pub judgment_errors: usize,
    pub queries_resolved: usize,
    pub error: Option<String>,
}

/// Aggregate outcome of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub total_sources: usize,
    pub total_items: usize,
    pub total_stored: usize,
    pub total_evaluated: usize,
    pub total_records_stored: usize,
    pub total_resolved: usize,
    pub failed_sources: usize,
    pub cancelled: bool,
    pub per_source: Vec<SourceRunStats>,
}

impl RunStats {
    fn add(&mut self, s: SourceRunStats) {
        self.total_sources += 1;
        self.total_items += s.items_found;
        self.total_stored += s.items_stored;
        self.total_evaluated += s.judgments_produced;
        self.total_records_stored += s.judgments_stored;
        self.total_resolved += s.queries_resolved;
        if s.error.is_some() {
            self.failed_sources += 1;
        }
        self.per_source.push(s);
    }

    /// Print the run summary table to stdout.
    pub fn print(&self) {
        println!(
            "  {:<28} {:>6} {:>7} {:>10} {:>9}  STATUS",
            "SOURCE", "FOUND", "STORED", "EVALUATED", "RESOLVED"
        );
        println!("  {}", "-".repeat(80));
        for s in &self.per_source {
            let status = match &s.error {
                Some(e) => format!("error: {}", e),
                None if s.judgment_errors > 0 => format!("ok ({} oracle errors)", s.judgment_errors),
                None => "ok".to_string(),
            };
            println!(
                "  {:<28} {:>6} {:>7} {:>10} {:>9}  {}",
                s.source,
                s.items_found,
                s.items_stored,
                s.judgments_produced,
                s.queries_resolved,
                status
            );
        }
        println!();
        println!("  sources: {} ({} failed)", self.total_sources, self.failed_sources);
        println!("  items found: {}", self.total_items);
        println!("  items stored: {}", self.total_stored);
        println!(
            "  judgments: {} ({} stored)",
            self.total_evaluated, self.total_records_stored
        );
        println!("  queries resolved: {}", self.total_resolved);
        if self.cancelled {
            println!("  (cancelled)");
        }
    }
}

/// Drives one run over a set of sources.
pub struct Pipeline {
    store: Arc<dyn ItemStore>,
    ledger: Arc<dyn QueryLedger>,
    oracle: Arc<dyn RelevanceOracle>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ItemStore>,
        ledger: Arc<dyn QueryLedger>,
        oracle: Arc<dyn RelevanceOracle>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            ledger,
            oracle,
            options,
        }
    }

    pub fn store(&self) -> &Arc<dyn ItemStore> {
        &self.store
    }

    pub async fn run(&self, sources: &[Box<dyn Source>], cancel: &CancelToken) -> RunStats {
        let mut stats = RunStats::default();
        info!(sources = sources.len(), oracle = self.oracle.name(), "run started");

        for (i, source) in sources.iter().enumerate() {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                break;
            }

            let mut source_stats = SourceRunStats {
                source: source.name().to_string(),
                ..Default::default()
            };
            if let Err(e) = self
                .run_source(source.as_ref(), &mut source_stats, cancel)
                .await
            {
                warn!(source = %source.name(), "source failed: {:#}", e);
                source_stats.error = Some(format!("{:#}", e));
            }
            stats.add(source_stats);

            if cancel.is_cancelled() {
                stats.cancelled = true;
                break;
            }
            if i + 1 < sources.len() && !self.options.source_delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.options.source_delay) => {}
                    _ = cancel.cancelled() => {
                        stats.cancelled = true;
                        break;
                    }
                }
            }
        }

        info!(
            items = stats.total_items,
            stored = stats.total_stored,
            evaluated = stats.total_evaluated,
            resolved = stats.total_resolved,
            failed = stats.failed_sources,
            "run finished"
        );
        stats
    }

    async fn run_source(
        &self,
        source: &dyn Source,
        stats: &mut SourceRunStats,
        cancel: &CancelToken,
    ) -> anyhow::Result<()> {
        let items = self.fetch(source).await?;
        stats.items_found = items.len();
        debug!(source = %source.name(), items = items.len(), "fetched");

        self.store.upsert_source(source.name(), source.url()).await?;
        stats.items_stored = self.store.store_items(&items).await?;

        let queries = self.ledger.list_open().await?;
        if queries.is_empty() {
            return Ok(());
        }

        for item in &items {
            for query in &queries {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                self.evaluate_pair(item, query, stats).await;
            }
        }
        Ok(())
    }

    async fn fetch(&self, source: &dyn Source) -> Result<Vec<Item>, FetchError> {
        match tokio::time::timeout(self.options.fetch_timeout, source.consume()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                secs: self.options.fetch_timeout.as_secs(),
            }),
        }
    }

    async fn evaluate_pair(
        &self,
        item: &Item,
        query: &Query,
        stats: &mut SourceRunStats,
    ) {
        let content = item.evaluation_text(self.options.content_max_chars);
        let judged = tokio::time::timeout(
            self.options.oracle_timeout,
            self.oracle.evaluate(&content, &query.text),
        )
        .await
        .unwrap_or_else(|_| {
            Err(OracleError::Timeout {
                secs: self.options.oracle_timeout.as_secs(),
            })
        });

        let (record, matched) = match judged {
            Ok(raw) => {
                let record = parse_judgment(&raw, item, query);
                let matched = is_match(&raw, &record, self.options.min_relevance_score);
                (record, matched)
            }
            Err(e) => {
                warn!(
                    identity = %item.identity,
                    query_id = query.id,
                    "oracle failed: {}",
                    e
                );
                stats.judgment_errors += 1;
                (error_record(&e, item, query), false)
            }
        };
        stats.judgments_produced += 1;

        if self.store.store_relevance_record(&record).await {
            stats.judgments_stored += 1;
        }

        if !matched {
            return;
        }
        match self.ledger.resolve(query.id, item).await {
            Ok(true) => {
                info!(
                    query_id = query.id,
                    identity = %item.identity,
                    source = %item.source_name,
                    score = record.score,
                    "query resolved"
                );
                stats.queries_resolved += 1;
            }
            Ok(false) => debug!(query_id = query.id, "query already resolved"),
            Err(e) => warn!(query_id = query.id, "resolve failed: {:#}", e),
        }
    }
}

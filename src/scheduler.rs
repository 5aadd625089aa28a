//! Repeated runs with retention cleanup and cancellation.
//!
//! [`Scheduler::run`] loops `run → cleanup → sleep` until `max_runs` is
//! reached or its [`CancelToken`] fires. The sleep is the only intentional
//! suspension point and always races the token, so cancellation is observed
//! without waiting out the interval. At most one run is in flight.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::ScheduleConfig;
use crate::pipeline::{Pipeline, RunStats};
use crate::sources::Source;

/// Triggers cancellation for every [`CancelToken`] it has handed out.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

/// Observes a [`CancelHandle`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            tx: std::sync::Arc::new(tx),
        }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Pending forever if the
    /// handle is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Loop parameters taken from `[schedule]` and CLI overrides.
#[derive(Debug, Clone)]
pub struct ScheduleOptions {
    pub interval: Duration,
    pub max_runs: Option<u32>,
    pub cleanup_enabled: bool,
    pub cleanup_days: u32,
}

impl From<&ScheduleConfig> for ScheduleOptions {
    fn from(config: &ScheduleConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_minutes.saturating_mul(60)),
            max_runs: config.max_runs,
            cleanup_enabled: config.cleanup_enabled,
            cleanup_days: config.cleanup_days,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleSummary {
    pub runs_completed: u32,
    pub items_removed: u64,
    pub cancelled: bool,
}

pub struct Scheduler {
    pipeline: Pipeline,
    sources: Vec<Box<dyn Source>>,
    options: ScheduleOptions,
}

impl Scheduler {
    pub fn new(pipeline: Pipeline, sources: Vec<Box<dyn Source>>, options: ScheduleOptions) -> Self {
        Self {
            pipeline,
            sources,
            options,
        }
    }

    /// Run until `max_runs` or cancellation. `on_run` sees each finished run.
    ///
    /// A failing run or cleanup is logged and the loop continues.
    pub async fn run<F>(&self, cancel: &CancelToken, mut on_run: F) -> ScheduleSummary
    where
        F: FnMut(u32, &RunStats),
    {
        let mut summary = ScheduleSummary::default();

        loop {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let run_no = summary.runs_completed + 1;
            info!(run = run_no, "scheduled run starting");
            let stats = self.pipeline.run(&self.sources, cancel).await;
            summary.runs_completed = run_no;
            on_run(run_no, &stats);

            if stats.cancelled {
                summary.cancelled = true;
                break;
            }

            if self.options.cleanup_enabled {
                match self
                    .pipeline
                    .store()
                    .cleanup_older_than(self.options.cleanup_days)
                    .await
                {
                    Ok(removed) => {
                        if removed > 0 {
                            info!(removed, days = self.options.cleanup_days, "retention cleanup");
                        }
                        summary.items_removed += removed;
                    }
                    Err(e) => warn!("retention cleanup failed: {:#}", e),
                }
            }

            if self.options.max_runs.is_some_and(|max| run_no >= max) {
                break;
            }

            info!(
                next_in_secs = self.options.interval.as_secs(),
                "waiting for next run"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.options.interval) => {}
                _ = cancel.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
            }
        }

        info!(
            runs = summary.runs_completed,
            cancelled = summary.cancelled,
            "scheduler stopped"
        );
        summary
    }
}

//! Periodic pass trigger.
//!
//! The scheduler runs on a tokio runtime but passes themselves are blocking;
//! each one is moved to the blocking pool and awaited before the next tick
//! is considered, so passes never overlap. Ticks missed while a pass runs
//! are skipped rather than queued.

use crate::error::{SyncError, SyncResult};
use crate::orchestrator::{Orchestrator, PassReport};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tandem_stores::StoreAdapter;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Totals for a scheduler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleSummary {
    /// Passes that recorded no error.
    pub succeeded: usize,
    /// Passes that recorded errors or aborted.
    pub failed: usize,
    /// Ticks skipped because a pass was already running elsewhere.
    pub skipped: usize,
}

impl ScheduleSummary {
    /// Passes started, successful or not.
    pub fn passes(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Invokes an orchestrator on a fixed interval.
pub struct Scheduler<P: StoreAdapter, S: StoreAdapter> {
    orchestrator: Arc<Orchestrator<P, S>>,
    interval: Duration,
    dry_run: bool,
}

impl<P, S> Scheduler<P, S>
where
    P: StoreAdapter + 'static,
    S: StoreAdapter + 'static,
{
    /// Creates a scheduler firing every `interval`.
    pub fn new(orchestrator: Arc<Orchestrator<P, S>>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval: interval.max(Duration::from_millis(1)),
            dry_run: false,
        }
    }

    /// Runs every pass as a dry run.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// The interval between passes.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The orchestrator being driven.
    pub fn orchestrator(&self) -> &Arc<Orchestrator<P, S>> {
        &self.orchestrator
    }

    /// Runs a single pass on the blocking pool.
    pub async fn run_once(&self) -> SyncResult<PassReport> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let dry_run = self.dry_run;
        tokio::task::spawn_blocking(move || orchestrator.run_pass(dry_run))
            .await
            .map_err(|e| SyncError::Runtime(e.to_string()))?
    }

    /// Runs passes every interval until `shutdown` resolves.
    ///
    /// The first pass starts immediately. A pass in flight when `shutdown`
    /// resolves is finished before returning. Pass failures are logged and
    /// counted; they never stop the loop.
    pub async fn run_forever(&self, shutdown: impl Future<Output = ()>) -> ScheduleSummary {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(interval_secs = self.interval.as_secs(), "scheduler started");
        let mut summary = ScheduleSummary::default();
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(report) if report.statistics.is_success() => summary.succeeded += 1,
                        Ok(report) => {
                            warn!(errors = report.statistics.error_count(), "scheduled pass recorded errors");
                            summary.failed += 1;
                        }
                        Err(SyncError::PassInProgress) => {
                            warn!("previous pass still running, tick skipped");
                            summary.skipped += 1;
                        }
                        Err(err) => {
                            error!(error = %err, "scheduled pass failed");
                            summary.failed += 1;
                        }
                    }
                }
            }
        }
        summary
    }
}

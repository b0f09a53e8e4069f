//! One reconciliation pass.

use crate::error::{ApplyError, SyncError, SyncResult};
use crate::health::{HealthState, HealthStore};
use crate::lock::PassLock;
use crate::plan::SyncPlan;
use crate::state::SyncState;
use crate::stats::RunStatistics;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::path::PathBuf;
use std::thread;
use tandem_protocol::{compute_delta, Record, Side, SyncDelta, UpdateKind};
use tandem_stores::{Fetched, StoreAdapter, StoreError, StoreResult, TranslationError};
use tracing::{debug, error, info, info_span, warn, Span};
use uuid::Uuid;

/// What a completed pass produced.
#[derive(Debug, Clone)]
pub struct PassReport {
    /// Counters and errors.
    pub statistics: RunStatistics,
    /// The delta that was applied, or would have been in a dry run.
    pub delta: SyncDelta,
}

impl PassReport {
    /// Delta sizes with a few samples per list.
    pub fn plan(&self) -> SyncPlan {
        SyncPlan::from_delta(&self.delta)
    }
}

/// Runs passes between a primary and a secondary store.
///
/// The orchestrator owns both adapters. At most one pass runs at a time per
/// orchestrator; with a lock file configured, at most one per lock file
/// across processes.
pub struct Orchestrator<P: StoreAdapter, S: StoreAdapter> {
    primary: P,
    secondary: S,
    health: HealthStore,
    lock_file: Option<PathBuf>,
    state: RwLock<SyncState>,
    history: Mutex<Vec<SyncState>>,
    last_run: RwLock<Option<RunStatistics>>,
    pass_guard: Mutex<()>,
}

impl<P: StoreAdapter, S: StoreAdapter> Orchestrator<P, S> {
    /// Creates an orchestrator writing its health document through `health`.
    pub fn new(primary: P, secondary: S, health: HealthStore) -> Self {
        Self {
            primary,
            secondary,
            health,
            lock_file: None,
            state: RwLock::new(SyncState::Idle),
            history: Mutex::new(Vec::new()),
            last_run: RwLock::new(None),
            pass_guard: Mutex::new(()),
        }
    }

    /// Guards passes with an advisory lock on `path`.
    pub fn with_lock_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_file = Some(path.into());
        self
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// States entered during the most recent pass, in order.
    pub fn state_history(&self) -> Vec<SyncState> {
        self.history.lock().clone()
    }

    /// Statistics of the most recent pass, fatal or not.
    pub fn last_run(&self) -> Option<RunStatistics> {
        self.last_run.read().clone()
    }

    /// The primary adapter.
    pub fn primary(&self) -> &P {
        &self.primary
    }

    /// The secondary adapter.
    pub fn secondary(&self) -> &S {
        &self.secondary
    }

    /// The health document store.
    pub fn health(&self) -> &HealthStore {
        &self.health
    }

    /// Runs one pass.
    ///
    /// Fatal errors abort the pass and are returned after the health document
    /// has been written. Failed writes are recorded in the statistics and do
    /// not abort. With `dry_run`, nothing is written to either store.
    pub fn run_pass(&self, dry_run: bool) -> SyncResult<PassReport> {
        let Some(_guard) = self.pass_guard.try_lock() else {
            return Err(SyncError::PassInProgress);
        };
        let _lock = match &self.lock_file {
            Some(path) => Some(PassLock::acquire(path)?),
            None => None,
        };

        let run_id = Uuid::new_v4();
        let span = info_span!("pass", %run_id, dry_run);
        let _entered = span.enter();

        self.history.lock().clear();
        self.enter(SyncState::Connecting)?;
        info!("sync pass started");

        let mut stats = RunStatistics::new(run_id, dry_run);
        let result = self.execute(&mut stats, dry_run, &span);
        if let Err(err) = &result {
            error!(error = %err, "sync pass aborted");
            stats.fatal = Some(err.to_string());
            self.enter(SyncState::Error)?;
        }

        self.enter(SyncState::Persisting)?;
        stats.finish();
        let persisted = self.health.save(&HealthState::from_statistics(&stats));
        *self.last_run.write() = Some(stats.clone());

        match (result, persisted) {
            (Err(err), persisted) => {
                if let Err(health_err) = persisted {
                    error!(error = %health_err, "could not record failed pass");
                }
                self.enter(SyncState::Error)?;
                Err(err)
            }
            (Ok(_), Err(err)) => {
                error!(error = %err, "could not record pass");
                self.enter(SyncState::Error)?;
                Err(err)
            }
            (Ok(delta), Ok(())) => {
                self.enter(SyncState::Idle)?;
                info!(
                    created = stats.created(),
                    updated = stats.updated(),
                    linked = stats.linked,
                    errors = stats.error_count(),
                    duration_ms = stats.duration().as_millis() as u64,
                    "sync pass finished"
                );
                Ok(PassReport {
                    statistics: stats,
                    delta,
                })
            }
        }
    }

    fn execute(
        &self,
        stats: &mut RunStatistics,
        dry_run: bool,
        span: &Span,
    ) -> SyncResult<SyncDelta> {
        self.primary
            .probe()
            .map_err(|source| SyncError::Connectivity {
                store: Side::Primary,
                source,
            })?;
        self.secondary
            .probe()
            .map_err(|source| SyncError::Connectivity {
                store: Side::Secondary,
                source,
            })?;

        self.enter(SyncState::Fetching)?;
        let (primary, secondary) = self.fetch_both(span)?;
        stats.primary_records = primary.records.len();
        stats.secondary_records = secondary.records.len();
        stats.skipped.extend(primary.skipped.iter().cloned());
        stats.skipped.extend(secondary.skipped.iter().cloned());
        info!(
            primary = stats.primary_records,
            secondary = stats.secondary_records,
            skipped = stats.skipped.len(),
            "fetched both stores"
        );

        let mut primary_records = primary.records;
        let mut secondary_records = secondary.records;
        backfill(&self.primary, &mut primary_records, stats, dry_run);
        backfill(&self.secondary, &mut secondary_records, stats, dry_run);

        self.enter(SyncState::Reconciling)?;
        let mut delta = compute_delta(&primary_records, &secondary_records);
        stats.quarantined = quarantine(&mut delta, &primary.skipped, &secondary.skipped);
        let summary = delta.summary();
        stats.planned = Some(summary);
        info!(
            create_in_primary = summary.create_in_primary,
            create_in_secondary = summary.create_in_secondary,
            update_in_primary = summary.update_in_primary,
            update_in_secondary = summary.update_in_secondary,
            link_only = summary.link_only,
            "delta computed"
        );

        self.enter(SyncState::Applying)?;
        if dry_run {
            info!(changes = summary.total(), "dry run, nothing applied");
        } else {
            self.apply(&delta, stats);
        }
        Ok(delta)
    }

    /// Fetches both stores on two scoped threads.
    fn fetch_both(&self, span: &Span) -> SyncResult<(Fetched, Fetched)> {
        let (primary, secondary) = thread::scope(|scope| {
            let primary = scope.spawn(|| {
                let _entered = span.enter();
                self.primary.fetch_all()
            });
            let secondary = scope.spawn(|| {
                let _entered = span.enter();
                self.secondary.fetch_all()
            });
            (joined(primary.join()), joined(secondary.join()))
        });

        let primary = primary.map_err(|source| SyncError::Fetch {
            store: Side::Primary,
            source,
        })?;
        let secondary = secondary.map_err(|source| SyncError::Fetch {
            store: Side::Secondary,
            source,
        })?;
        Ok((primary, secondary))
    }

    /// Writes the delta in fixed order. Failures are recorded, never raised.
    fn apply(&self, delta: &SyncDelta, stats: &mut RunStatistics) {
        for record in &delta.create_in_primary {
            let mut draft = record.clone();
            draft.primary_id = None;
            let created = attempt(stats, "create in primary", record.label(), || {
                self.primary.upsert(&draft)
            });
            let Some(created) = created else { continue };
            stats.created_in_primary += 1;
            if let (Some(page_id), Some(row_id)) = (&record.secondary_id, &created.primary_id) {
                link(&self.secondary, page_id, row_id, stats);
            }
        }

        for record in &delta.create_in_secondary {
            let mut draft = record.clone();
            draft.secondary_id = None;
            let created = attempt(stats, "create in secondary", record.label(), || {
                self.secondary.upsert(&draft)
            });
            let Some(created) = created else { continue };
            stats.created_in_secondary += 1;
            if let (Some(row_id), Some(page_id)) = (&record.primary_id, &created.secondary_id) {
                link(&self.primary, row_id, page_id, stats);
            }
        }

        for update in &delta.update_in_primary {
            let proposed = &update.proposed;
            match update.kind {
                UpdateKind::Content => {
                    if attempt(stats, "update in primary", proposed.label(), || {
                        self.primary.upsert(proposed)
                    })
                    .is_some()
                    {
                        stats.updated_in_primary += 1;
                    }
                }
                UpdateKind::LinkOnly => {
                    if let (Some(row_id), Some(page_id)) =
                        (&proposed.primary_id, &proposed.secondary_id)
                    {
                        if link(&self.primary, row_id, page_id, stats) {
                            link(&self.secondary, page_id, row_id, stats);
                        }
                    }
                }
            }
        }

        for update in &delta.update_in_secondary {
            let proposed = &update.proposed;
            match update.kind {
                UpdateKind::Content => {
                    if attempt(stats, "update in secondary", proposed.label(), || {
                        self.secondary.upsert(proposed)
                    })
                    .is_some()
                    {
                        stats.updated_in_secondary += 1;
                    }
                }
                UpdateKind::LinkOnly => {
                    if let (Some(page_id), Some(row_id)) =
                        (&proposed.secondary_id, &proposed.primary_id)
                    {
                        link(&self.secondary, page_id, row_id, stats);
                    }
                }
            }
        }
    }

    fn enter(&self, next: SyncState) -> SyncResult<()> {
        let mut state = self.state.write();
        *state = state.transition(next)?;
        self.history.lock().push(next);
        debug!(state = %next, "state changed");
        Ok(())
    }
}

fn joined(result: thread::Result<StoreResult<Fetched>>) -> StoreResult<Fetched> {
    result.unwrap_or_else(|_| Err(StoreError::transport_fatal("fetch thread panicked")))
}

/// Fills in missing fingerprints and, unless dry-run, writes them back.
///
/// Only the fingerprint is written; content goes untouched, so a record the
/// store could no longer accept in full is still backfilled.
fn backfill<A: StoreAdapter>(
    adapter: &A,
    records: &mut [Record],
    stats: &mut RunStatistics,
    dry_run: bool,
) {
    let side = adapter.side();
    for record in records.iter_mut() {
        if !record.ensure_fingerprint() || dry_run {
            continue;
        }
        let own_id = match side {
            Side::Primary => record.primary_id.as_deref(),
            Side::Secondary => record.secondary_id.as_deref(),
        };
        let (Some(id), Some(fingerprint)) = (own_id, record.fingerprint.as_ref()) else {
            continue;
        };
        let action = format!("backfill fingerprint in {}", adapter.name());
        match attempt(stats, &action, id, || adapter.set_fingerprint(id, fingerprint)) {
            Some(true) => stats.fingerprints_backfilled += 1,
            Some(false) => {
                stats.record_error(ApplyError::new(action, id, "record not found"));
            }
            None => {}
        }
    }
}

/// Drops creates whose counterpart exists but failed to translate.
///
/// Returns the number of creates withheld.
fn quarantine(
    delta: &mut SyncDelta,
    primary_skipped: &[TranslationError],
    secondary_skipped: &[TranslationError],
) -> usize {
    let items = |skipped: &[TranslationError]| -> HashSet<String> {
        skipped.iter().map(|err| err.item.clone()).collect()
    };
    let counterparts = |skipped: &[TranslationError]| -> HashSet<String> {
        skipped
            .iter()
            .filter_map(|err| err.counterpart.clone())
            .collect()
    };
    let skipped_rows = items(primary_skipped);
    let skipped_pages = items(secondary_skipped);
    let pages_of_skipped_rows = counterparts(primary_skipped);
    let rows_of_skipped_pages = counterparts(secondary_skipped);

    let held = |id: &Option<String>, set: &HashSet<String>| {
        id.as_ref().is_some_and(|id| set.contains(id))
    };
    let before = delta.create_in_primary.len() + delta.create_in_secondary.len();

    delta.create_in_secondary.retain(|record| {
        let keep = !held(&record.secondary_id, &skipped_pages)
            && !held(&record.primary_id, &rows_of_skipped_pages);
        if !keep {
            warn!(record = record.label(), "withholding create, counterpart page unreadable");
        }
        keep
    });
    delta.create_in_primary.retain(|record| {
        let keep = !held(&record.primary_id, &skipped_rows)
            && !held(&record.secondary_id, &pages_of_skipped_rows);
        if !keep {
            warn!(record = record.label(), "withholding create, counterpart row unreadable");
        }
        keep
    });

    before - delta.create_in_primary.len() - delta.create_in_secondary.len()
}

fn attempt<T>(
    stats: &mut RunStatistics,
    action: &str,
    label: &str,
    op: impl FnOnce() -> StoreResult<T>,
) -> Option<T> {
    match op() {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(action, record = label, error = %err, "write failed");
            stats.record_error(ApplyError::new(action, label, err.to_string()));
            None
        }
    }
}

fn link<A: StoreAdapter>(
    adapter: &A,
    record_id: &str,
    counterpart_id: &str,
    stats: &mut RunStatistics,
) -> bool {
    let action = format!("link in {}", adapter.name());
    match attempt(stats, &action, record_id, || {
        adapter.mark_linked(record_id, counterpart_id)
    }) {
        Some(true) => {
            stats.linked += 1;
            true
        }
        Some(false) => {
            stats.record_error(ApplyError::new(action, record_id, "record not found"));
            false
        }
        None => false,
    }
}

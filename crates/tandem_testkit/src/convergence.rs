//! Pure model of applying a delta to two stores.
//!
//! [`Simulation`] applies a [`SyncDelta`] the same way the orchestrator
//! does against live stores: creates receive a fresh id and both sides of
//! the new link are written, content updates replace content, link-only
//! updates set the link on both sides. It lets property tests check that
//! one pass converges without any I/O.

use chrono::{DateTime, TimeZone, Utc};
use tandem_protocol::{compute_delta, Record, SyncDelta, UpdateKind};

/// Two record sets and a logical clock.
#[derive(Debug, Clone, Default)]
pub struct Simulation {
    /// Primary store contents.
    pub primary: Vec<Record>,
    /// Secondary store contents.
    pub secondary: Vec<Record>,
    next_id: usize,
    clock: i64,
}

impl Simulation {
    /// Starts from the given store contents.
    pub fn new(primary: Vec<Record>, secondary: Vec<Record>) -> Self {
        Self {
            primary,
            secondary,
            next_id: 0,
            clock: 0,
        }
    }

    /// The delta for the current contents.
    pub fn delta(&self) -> SyncDelta {
        compute_delta(&self.primary, &self.secondary)
    }

    /// Returns true if the delta is empty.
    pub fn converged(&self) -> bool {
        self.delta().is_empty()
    }

    /// Computes and applies one delta, returning it.
    pub fn run_pass(&mut self) -> SyncDelta {
        let delta = self.delta();
        self.apply(&delta);
        delta
    }

    /// Applies every list of `delta`.
    pub fn apply(&mut self, delta: &SyncDelta) {
        for record in &delta.create_in_primary {
            let row = self.allocate("sim-r");
            let mut created = record.clone();
            created.primary_id = Some(row.clone());
            created.linked = created.secondary_id.is_some();
            self.stamp_and_fill(&mut created);
            self.primary.push(created);
            if let Some(page) = record.secondary_id.as_deref() {
                if let Some(target) = find(&mut self.secondary, |r| &r.secondary_id, page) {
                    target.primary_id = Some(row);
                    target.linked = true;
                }
            }
        }

        for record in &delta.create_in_secondary {
            let page = self.allocate("sim-p");
            let mut created = record.clone();
            created.secondary_id = Some(page.clone());
            created.linked = created.primary_id.is_some();
            self.stamp_and_fill(&mut created);
            self.secondary.push(created);
            if let Some(row) = record.primary_id.as_deref() {
                if let Some(target) = find(&mut self.primary, |r| &r.primary_id, row) {
                    target.secondary_id = Some(page);
                    target.linked = true;
                }
            }
        }

        for update in &delta.update_in_primary {
            let Some(row) = update.current.primary_id.clone() else {
                continue;
            };
            match update.kind {
                UpdateKind::Content => {
                    let mut proposed = update.proposed.clone();
                    self.stamp_and_fill(&mut proposed);
                    if let Some(target) = find(&mut self.primary, |r| &r.primary_id, &row) {
                        *target = proposed;
                    }
                }
                UpdateKind::LinkOnly => {
                    let Some(page) = update.proposed.secondary_id.clone() else {
                        continue;
                    };
                    if let Some(target) = find(&mut self.primary, |r| &r.primary_id, &row) {
                        target.secondary_id = Some(page.clone());
                        target.linked = true;
                    }
                    if let Some(target) = find(&mut self.secondary, |r| &r.secondary_id, &page) {
                        target.primary_id = Some(row);
                        target.linked = true;
                    }
                }
            }
        }

        for update in &delta.update_in_secondary {
            let Some(page) = update.current.secondary_id.clone() else {
                continue;
            };
            let mut proposed = update.proposed.clone();
            self.stamp_and_fill(&mut proposed);
            if let Some(target) = find(&mut self.secondary, |r| &r.secondary_id, &page) {
                *target = proposed;
            }
        }
    }

    fn allocate(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn stamp_and_fill(&mut self, record: &mut Record) {
        self.clock += 1;
        record.updated_at = server_time(self.clock);
        record.fingerprint = Some(record.content_fingerprint());
    }
}

fn server_time(tick: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(1_900_000_000 + tick, 0).single()
}

fn find<'a>(
    records: &'a mut [Record],
    id: impl Fn(&Record) -> &Option<String>,
    wanted: &str,
) -> Option<&'a mut Record> {
    records
        .iter_mut()
        .find(|record| id(record).as_deref() == Some(wanted))
}

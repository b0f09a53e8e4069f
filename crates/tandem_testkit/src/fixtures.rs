//! Test fixtures and store helpers.
//!
//! Provides fixed timestamps, sample records and a pair of seeded in-memory
//! stores for orchestrator tests.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use tandem_protocol::{compute_delta, Record, SyncDelta};
use tandem_stores::MemoryStore;

/// Categories used by fixtures and generators.
pub const CATEGORIES: [&str; 5] = ["Architecture", "Policy", "Ops", "Hiring", "Finance"];

/// A timestamp on a fixed day, `hour` hours after midnight UTC.
pub fn fixed_time(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0)
        .single()
        .map(|start| start + chrono::Duration::hours(i64::from(hour)))
        .expect("valid fixture time")
}

/// A date in March 2024.
pub fn fixed_date(day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(2024, 3, day)
}

/// An unlinked record with a fixed effective date.
pub fn decision(text: &str, category: &str) -> Record {
    Record::new(text, category, fixed_date(1))
}

/// A primary record and a secondary record linked to each other with the
/// same content and fingerprint.
pub fn linked_pair(primary_id: &str, page_id: &str, text: &str, category: &str) -> (Record, Record) {
    let content = decision(text, category);
    let fingerprint = content.content_fingerprint();
    let primary = content
        .clone()
        .with_primary_id(primary_id)
        .with_secondary_id(page_id)
        .with_linked(true)
        .with_fingerprint(fingerprint.clone());
    let page = content
        .with_secondary_id(page_id)
        .with_primary_id(primary_id)
        .with_linked(true)
        .with_fingerprint(fingerprint);
    (primary, page)
}

/// Two in-memory stores standing in for the primary and secondary stores.
///
/// Cloning shares the underlying stores.
#[derive(Clone)]
pub struct StorePair {
    /// The primary store.
    pub primary: Arc<MemoryStore>,
    /// The secondary store.
    pub secondary: Arc<MemoryStore>,
}

impl StorePair {
    /// Creates two empty stores.
    pub fn new() -> Self {
        Self {
            primary: Arc::new(MemoryStore::primary()),
            secondary: Arc::new(MemoryStore::secondary()),
        }
    }

    /// Creates two empty stores listing `page_size` records per page.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            primary: Arc::new(MemoryStore::primary().with_page_size(page_size)),
            secondary: Arc::new(MemoryStore::secondary().with_page_size(page_size)),
        }
    }

    /// Inserts records into the primary store, returning them as stored.
    pub fn seed_primary(&self, records: impl IntoIterator<Item = Record>) -> Vec<Record> {
        records.into_iter().map(|r| self.primary.insert(r)).collect()
    }

    /// Inserts records into the secondary store, returning them as stored.
    pub fn seed_secondary(&self, records: impl IntoIterator<Item = Record>) -> Vec<Record> {
        records.into_iter().map(|r| self.secondary.insert(r)).collect()
    }

    /// Inserts a linked pair with the given ids.
    pub fn seed_linked(&self, primary_id: &str, page_id: &str, text: &str, category: &str) {
        let (primary, page) = linked_pair(primary_id, page_id, text, category);
        self.primary.insert(primary);
        self.secondary.insert(page);
    }

    /// The delta between the current contents of both stores.
    pub fn delta(&self) -> SyncDelta {
        compute_delta(&self.primary.records(), &self.secondary.records())
    }

    /// Returns true if reconciling now would change nothing.
    pub fn converged(&self) -> bool {
        self.delta().is_empty()
    }

    /// Total writes issued to either store so far.
    pub fn writes(&self) -> usize {
        self.primary.calls().writes() + self.secondary.calls().writes()
    }
}

impl Default for StorePair {
    fn default() -> Self {
        Self::new()
    }
}

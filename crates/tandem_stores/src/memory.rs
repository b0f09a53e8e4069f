//! In-memory store adapter.
//!
//! `MemoryStore` behaves like a remote store from the orchestrator's point of
//! view: it assigns identifiers on create, stamps update times itself, pages
//! its listing and can be told to fail. It backs the engine tests and the
//! benchmarks.

use crate::adapter::{Fetched, StoreAdapter};
use crate::error::{StoreError, StoreResult, TranslationError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tandem_protocol::{Fingerprint, Record, Side};

/// Per-operation call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `probe` calls.
    pub probes: usize,
    /// `fetch_all` calls.
    pub fetches: usize,
    /// `upsert` calls, including failed ones.
    pub upserts: usize,
    /// `mark_linked` calls.
    pub links: usize,
    /// `set_fingerprint` calls.
    pub fingerprints: usize,
}

impl CallCounts {
    /// Number of calls that could have written data.
    pub fn writes(&self) -> usize {
        self.upserts + self.links + self.fingerprints
    }
}

#[derive(Debug, Default)]
struct Failures {
    unreachable: bool,
    fetch_page: Option<usize>,
    upsert_keys: HashSet<String>,
    untranslatable: Vec<TranslationError>,
}

#[derive(Debug)]
struct Inner {
    records: Vec<Record>,
    index: HashMap<String, usize>,
    next_id: u64,
    clock: DateTime<Utc>,
    calls: CallCounts,
    failures: Failures,
}

/// An in-process store for one side of the sync.
#[derive(Debug)]
pub struct MemoryStore {
    side: Side,
    page_size: usize,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store for `side`.
    pub fn new(side: Side) -> Self {
        Self {
            side,
            page_size: 100,
            inner: Mutex::new(Inner {
                records: Vec::new(),
                index: HashMap::new(),
                next_id: 1,
                clock: Utc::now(),
                calls: CallCounts::default(),
                failures: Failures::default(),
            }),
        }
    }

    /// Creates an empty primary store.
    pub fn primary() -> Self {
        Self::new(Side::Primary)
    }

    /// Creates an empty secondary store.
    pub fn secondary() -> Self {
        Self::new(Side::Secondary)
    }

    /// Sets the listing page size used for fetch failure injection.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Inserts a record directly, bypassing failure injection.
    ///
    /// Assigns an identifier when the record has none on this side and
    /// stamps an update time when the record carries none.
    pub fn insert(&self, mut record: Record) -> Record {
        let mut inner = self.inner.lock();
        let id = match own_id(self.side, &record) {
            Some(id) => id.to_string(),
            None => inner.allocate_id(self.side),
        };
        set_own_id(self.side, &mut record, id.clone());
        if record.updated_at.is_none() {
            record.updated_at = Some(inner.tick());
        }
        inner.put(id, record.clone());
        record
    }

    /// Applies `edit` to a stored record as a user would, bumping its update
    /// time. Returns false if no record has that id.
    pub fn edit(&self, id: &str, edit: impl FnOnce(&mut Record)) -> bool {
        let mut inner = self.inner.lock();
        let now = inner.tick();
        match inner.index.get(id).copied() {
            Some(slot) => {
                let record = &mut inner.records[slot];
                edit(record);
                record.updated_at = Some(now);
                true
            }
            None => false,
        }
    }

    /// Deletes a record. Returns false if no record has that id.
    pub fn remove(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        let Some(slot) = inner.index.remove(id) else {
            return false;
        };
        inner.records.remove(slot);
        inner.reindex(self.side);
        true
    }

    /// Returns a stored record by id.
    pub fn get(&self, id: &str) -> Option<Record> {
        let inner = self.inner.lock();
        inner.index.get(id).map(|slot| inner.records[*slot].clone())
    }

    /// Returns every stored record in insertion order.
    pub fn records(&self) -> Vec<Record> {
        self.inner.lock().records.clone()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call counters so far.
    pub fn calls(&self) -> CallCounts {
        self.inner.lock().calls
    }

    /// Makes every adapter call fail with a transport error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.lock().failures.unreachable = unreachable;
    }

    /// Makes `fetch_all` fail on the given 1-based listing page.
    pub fn fail_fetch_page(&self, page: Option<usize>) {
        self.inner.lock().failures.fetch_page = page;
    }

    /// Makes `upsert` fail for records whose id on this side, or whose
    /// text, equals `key`.
    pub fn fail_upsert_for(&self, key: impl Into<String>) {
        self.inner.lock().failures.upsert_keys.insert(key.into());
    }

    /// Reports `error` as an untranslatable item on every fetch.
    pub fn add_untranslatable(&self, error: TranslationError) {
        self.inner.lock().failures.untranslatable.push(error);
    }

    fn unreachable_error(&self) -> StoreError {
        StoreError::transport_retryable(format!("{} store unreachable", self.side))
    }
}

impl Inner {
    fn allocate_id(&mut self, side: Side) -> String {
        let n = self.next_id;
        self.next_id += 1;
        match side {
            Side::Primary => n.to_string(),
            Side::Secondary => format!("page-{n}"),
        }
    }

    /// Strictly increasing server time.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        self.clock = if now > self.clock {
            now
        } else {
            self.clock + ChronoDuration::milliseconds(1)
        };
        self.clock
    }

    fn put(&mut self, id: String, record: Record) {
        match self.index.get(&id) {
            Some(slot) => self.records[*slot] = record,
            None => {
                self.index.insert(id, self.records.len());
                self.records.push(record);
            }
        }
    }

    fn reindex(&mut self, side: Side) {
        self.index = self
            .records
            .iter()
            .enumerate()
            .filter_map(|(slot, record)| own_id(side, record).map(|id| (id.to_string(), slot)))
            .collect();
    }
}

fn own_id(side: Side, record: &Record) -> Option<&str> {
    match side {
        Side::Primary => record.primary_id.as_deref(),
        Side::Secondary => record.secondary_id.as_deref(),
    }
}

fn set_own_id(side: Side, record: &mut Record, id: String) {
    match side {
        Side::Primary => record.primary_id = Some(id),
        Side::Secondary => record.secondary_id = Some(id),
    }
}

fn counterpart_id(side: Side, record: &Record) -> Option<&str> {
    own_id(side.other(), record)
}

impl StoreAdapter for MemoryStore {
    fn side(&self) -> Side {
        self.side
    }

    fn probe(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.calls.probes += 1;
        if inner.failures.unreachable {
            return Err(self.unreachable_error());
        }
        Ok(())
    }

    fn fetch_all(&self) -> StoreResult<Fetched> {
        let mut inner = self.inner.lock();
        inner.calls.fetches += 1;
        if inner.failures.unreachable {
            return Err(self.unreachable_error());
        }

        let pages = inner.records.len() / self.page_size + 1;
        if let Some(page) = inner.failures.fetch_page.filter(|page| *page <= pages) {
            return Err(StoreError::RetriesExhausted {
                operation: format!("fetch page {page}"),
                attempts: 3,
                last: Box::new(StoreError::Timeout),
            });
        }

        Ok(Fetched {
            records: inner.records.clone(),
            skipped: inner.failures.untranslatable.clone(),
        })
    }

    fn upsert(&self, record: &Record) -> StoreResult<Record> {
        let mut inner = self.inner.lock();
        inner.calls.upserts += 1;
        if inner.failures.unreachable {
            return Err(self.unreachable_error());
        }
        let failing = &inner.failures.upsert_keys;
        if failing.contains(&record.text)
            || own_id(self.side, record).is_some_and(|id| failing.contains(id))
        {
            return Err(StoreError::Status {
                status: 422,
                body: format!("rejected {}", record.label()),
            });
        }

        let id = match own_id(self.side, record) {
            Some(id) if inner.index.contains_key(id) => id.to_string(),
            Some(id) => {
                return Err(StoreError::Status {
                    status: 404,
                    body: format!("no record with id {id}"),
                })
            }
            None => inner.allocate_id(self.side),
        };

        let mut stored = record.clone();
        set_own_id(self.side, &mut stored, id.clone());
        stored.fingerprint = Some(stored.content_fingerprint());
        stored.linked = counterpart_id(self.side, &stored).is_some();
        stored.updated_at = Some(inner.tick());
        inner.put(id, stored.clone());
        Ok(stored)
    }

    fn mark_linked(&self, record_id: &str, counterpart: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        inner.calls.links += 1;
        if inner.failures.unreachable {
            return Err(self.unreachable_error());
        }
        let Some(slot) = inner.index.get(record_id).copied() else {
            return Ok(false);
        };
        let record = &mut inner.records[slot];
        set_own_id(self.side.other(), record, counterpart.to_string());
        record.linked = true;
        Ok(true)
    }

    fn set_fingerprint(&self, record_id: &str, fingerprint: &Fingerprint) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        inner.calls.fingerprints += 1;
        if inner.failures.unreachable {
            return Err(self.unreachable_error());
        }
        let Some(slot) = inner.index.get(record_id).copied() else {
            return Ok(false);
        };
        inner.records[slot].fingerprint = Some(fingerprint.clone());
        Ok(true)
    }

    fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> StoreResult<Option<Record>> {
        let inner = self.inner.lock();
        if inner.failures.unreachable {
            return Err(self.unreachable_error());
        }
        Ok(inner
            .records
            .iter()
            .find(|record| record.fingerprint.as_ref() == Some(fingerprint))
            .cloned())
    }
}

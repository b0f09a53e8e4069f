//! The store adapter contract.

use crate::error::{StoreResult, TranslationError};
use tandem_protocol::{Fingerprint, Record, Side};

/// Everything a full fetch returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fetched {
    /// Records that translated cleanly.
    pub records: Vec<Record>,
    /// Items that could not be translated and were skipped.
    pub skipped: Vec<TranslationError>,
}

impl Fetched {
    /// Creates a fetch result with no skipped items.
    pub fn from_records(records: Vec<Record>) -> Self {
        Self {
            records,
            skipped: Vec::new(),
        }
    }
}

/// A store the orchestrator can synchronize.
///
/// Both stores implement the same contract over different transports. The
/// orchestrator owns one adapter per side and never reaches past it.
pub trait StoreAdapter: Send + Sync {
    /// Which side of the sync this adapter serves.
    fn side(&self) -> Side;

    /// Store name used in logs and error messages.
    fn name(&self) -> &'static str {
        self.side().as_str()
    }

    /// Lightweight reachability check. Must not touch data.
    fn probe(&self) -> StoreResult<()>;

    /// Fetches every record, paging internally until the store signals
    /// completion.
    ///
    /// A page that keeps failing after the retry budget is exhausted fails
    /// the whole call; a partial result is never returned as complete.
    fn fetch_all(&self) -> StoreResult<Fetched>;

    /// Creates or updates `record`, keyed by this store's identifier.
    ///
    /// Returns the record as stored, including the server-side update time
    /// and the identifier assigned on create.
    fn upsert(&self, record: &Record) -> StoreResult<Record>;

    /// Records `counterpart_id` as the link of `record_id` without touching
    /// content fields. Returns false if the record was not found.
    fn mark_linked(&self, record_id: &str, counterpart_id: &str) -> StoreResult<bool>;

    /// Stores `fingerprint` on `record_id` without touching content fields.
    /// Returns false if the record was not found.
    fn set_fingerprint(&self, record_id: &str, fingerprint: &Fingerprint) -> StoreResult<bool>;

    /// Looks up a record by stored fingerprint.
    ///
    /// Fallback lookup only; the main pass never calls this.
    fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> StoreResult<Option<Record>>;
}

impl<T: StoreAdapter + ?Sized> StoreAdapter for Box<T> {
    fn side(&self) -> Side {
        (**self).side()
    }

    fn probe(&self) -> StoreResult<()> {
        (**self).probe()
    }

    fn fetch_all(&self) -> StoreResult<Fetched> {
        (**self).fetch_all()
    }

    fn upsert(&self, record: &Record) -> StoreResult<Record> {
        (**self).upsert(record)
    }

    fn mark_linked(&self, record_id: &str, counterpart_id: &str) -> StoreResult<bool> {
        (**self).mark_linked(record_id, counterpart_id)
    }

    fn set_fingerprint(&self, record_id: &str, fingerprint: &Fingerprint) -> StoreResult<bool> {
        (**self).set_fingerprint(record_id, fingerprint)
    }

    fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> StoreResult<Option<Record>> {
        (**self).find_by_fingerprint(fingerprint)
    }
}

impl<T: StoreAdapter + ?Sized> StoreAdapter for std::sync::Arc<T> {
    fn side(&self) -> Side {
        (**self).side()
    }

    fn probe(&self) -> StoreResult<()> {
        (**self).probe()
    }

    fn fetch_all(&self) -> StoreResult<Fetched> {
        (**self).fetch_all()
    }

    fn upsert(&self, record: &Record) -> StoreResult<Record> {
        (**self).upsert(record)
    }

    fn mark_linked(&self, record_id: &str, counterpart_id: &str) -> StoreResult<bool> {
        (**self).mark_linked(record_id, counterpart_id)
    }

    fn set_fingerprint(&self, record_id: &str, fingerprint: &Fingerprint) -> StoreResult<bool> {
        (**self).set_fingerprint(record_id, fingerprint)
    }

    fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> StoreResult<Option<Record>> {
        (**self).find_by_fingerprint(fingerprint)
    }
}

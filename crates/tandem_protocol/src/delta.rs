//! Output of one reconciliation.

use crate::record::Record;
use serde::{Deserialize, Serialize};

/// What an update changes on the target record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// Content fields are overwritten with the authoritative side's values.
    Content,
    /// Only the counterpart identifier and link flag are set.
    LinkOnly,
}

/// A pending update of one existing record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordUpdate {
    /// The record as currently stored in the target store.
    pub current: Record,
    /// The record as it should be stored after the update.
    pub proposed: Record,
    /// Whether content or only the link changes.
    pub kind: UpdateKind,
}

impl RecordUpdate {
    /// Creates a content update.
    pub fn content(current: Record, proposed: Record) -> Self {
        Self {
            current,
            proposed,
            kind: UpdateKind::Content,
        }
    }

    /// Creates a link-only update.
    pub fn link_only(current: Record, proposed: Record) -> Self {
        Self {
            current,
            proposed,
            kind: UpdateKind::LinkOnly,
        }
    }
}

/// The creates and updates needed to converge both stores.
///
/// The four lists are disjoint: a record appears in at most one create list,
/// and a linked pair appears in at most one update list per direction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDelta {
    /// Secondary records with no primary counterpart.
    pub create_in_primary: Vec<Record>,
    /// Primary records with no secondary counterpart.
    pub create_in_secondary: Vec<Record>,
    /// Primary records to overwrite or link.
    pub update_in_primary: Vec<RecordUpdate>,
    /// Secondary records to overwrite.
    pub update_in_secondary: Vec<RecordUpdate>,
}

impl SyncDelta {
    /// Total number of mutations.
    pub fn total_changes(&self) -> usize {
        self.create_in_primary.len()
            + self.create_in_secondary.len()
            + self.update_in_primary.len()
            + self.update_in_secondary.len()
    }

    /// Returns true if the stores are already converged.
    pub fn is_empty(&self) -> bool {
        self.total_changes() == 0
    }

    /// Per-list counts.
    pub fn summary(&self) -> DeltaSummary {
        DeltaSummary {
            create_in_primary: self.create_in_primary.len(),
            create_in_secondary: self.create_in_secondary.len(),
            update_in_primary: self.update_in_primary.len(),
            update_in_secondary: self.update_in_secondary.len(),
            link_only: self
                .update_in_primary
                .iter()
                .chain(&self.update_in_secondary)
                .filter(|update| update.kind == UpdateKind::LinkOnly)
                .count(),
        }
    }
}

/// Sizes of the lists in a [`SyncDelta`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaSummary {
    /// Number of creates in the primary store.
    pub create_in_primary: usize,
    /// Number of creates in the secondary store.
    pub create_in_secondary: usize,
    /// Number of updates in the primary store.
    pub update_in_primary: usize,
    /// Number of updates in the secondary store.
    pub update_in_secondary: usize,
    /// How many of the updates only set a link.
    pub link_only: usize,
}

impl DeltaSummary {
    /// Total number of mutations.
    pub fn total(&self) -> usize {
        self.create_in_primary
            + self.create_in_secondary
            + self.update_in_primary
            + self.update_in_secondary
    }
}

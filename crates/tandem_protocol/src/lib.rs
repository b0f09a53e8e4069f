//! # Tandem Protocol
//!
//! Record model and reconciliation engine for tandem.
//!
//! This crate provides:
//! - `Record`, the canonical entity kept consistent between the two stores
//! - `fingerprint`, the content hash used to match records across stores
//! - `SyncDelta`, the set of creates/updates needed to converge both stores
//! - The last-write-wins conflict rule
//! - `compute_delta`, the three-pass reconciliation algorithm
//!
//! This is a pure crate with no I/O operations.
//!
//! ## Key Invariants
//!
//! - Identical normalized content yields an identical fingerprint
//! - `compute_delta` is deterministic and holds no state across calls
//! - Every input record lands in exactly one of {no-op, update, create}

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod delta;
mod fingerprint;
mod reconcile;
mod record;

pub use conflict::{resolve_conflict, Side};
pub use delta::{DeltaSummary, RecordUpdate, SyncDelta, UpdateKind};
pub use fingerprint::{fingerprint, normalize_date, normalize_text, Fingerprint, FIELD_SEPARATOR};
pub use reconcile::compute_delta;
pub use record::{parse_date, parse_timestamp, Record};

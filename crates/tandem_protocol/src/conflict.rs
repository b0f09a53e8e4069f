//! Conflict resolution between the two stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two synchronized stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The relational system of record.
    Primary,
    /// The page-based collaboration store.
    Secondary,
}

impl Side {
    /// Returns the opposite store.
    pub fn other(&self) -> Side {
        match self {
            Side::Primary => Side::Secondary,
            Side::Secondary => Side::Primary,
        }
    }

    /// Lower-case name used in logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Primary => "primary",
            Side::Secondary => "secondary",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Picks the authoritative side for a linked pair whose content diverged.
///
/// The primary store wins only with a strictly later `updated_at`; equal
/// timestamps go to the secondary store. A present timestamp beats a
/// missing one, and when both are missing the primary store wins.
pub fn resolve_conflict(
    primary_updated: Option<DateTime<Utc>>,
    secondary_updated: Option<DateTime<Utc>>,
) -> Side {
    match (primary_updated, secondary_updated) {
        (Some(primary), Some(secondary)) if secondary >= primary => Side::Secondary,
        (None, Some(_)) => Side::Secondary,
        _ => Side::Primary,
    }
}

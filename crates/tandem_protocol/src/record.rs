//! The synchronized record.

use crate::fingerprint::{fingerprint, Fingerprint};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A record as seen by one of the two stores.
///
/// `Record` is the canonical entity the reconciliation engine works on.
/// Each adapter translates its native representation into this shape, so
/// the engine never sees store-specific field names.
///
/// # Fields
///
/// - `primary_id`: identifier in the primary store, `None` until created there
/// - `secondary_id`: identifier in the secondary store, `None` until linked
/// - `text`, `category`, `effective_date`: the core content fields
/// - `fingerprint`: stored content hash, `None` if never computed
/// - `linked`: whether the origin store has recorded the counterpart link
/// - `updated_at`: last server-side write time in the origin store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Identifier in the primary store.
    pub primary_id: Option<String>,
    /// Identifier in the secondary store.
    pub secondary_id: Option<String>,
    /// Free-text body of the record.
    pub text: String,
    /// Category label.
    pub category: String,
    /// Effective date of the record.
    pub effective_date: Option<NaiveDate>,
    /// Stored fingerprint, if the origin store has one.
    pub fingerprint: Option<Fingerprint>,
    /// Whether the origin store marks this record as linked.
    pub linked: bool,
    /// Last update time reported by the origin store.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Creates an unlinked record with the given content.
    pub fn new(
        text: impl Into<String>,
        category: impl Into<String>,
        effective_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            text: text.into(),
            category: category.into(),
            effective_date,
            ..Self::default()
        }
    }

    /// Sets the primary store identifier.
    pub fn with_primary_id(mut self, id: impl Into<String>) -> Self {
        self.primary_id = Some(id.into());
        self
    }

    /// Sets the secondary store identifier.
    pub fn with_secondary_id(mut self, id: impl Into<String>) -> Self {
        self.secondary_id = Some(id.into());
        self
    }

    /// Sets the origin store's update time.
    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    /// Sets the stored fingerprint.
    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    /// Sets the linked flag.
    pub fn with_linked(mut self, linked: bool) -> Self {
        self.linked = linked;
        self
    }

    /// Computes the fingerprint of the current content.
    ///
    /// This ignores the stored `fingerprint` field, which may be stale if
    /// the record was edited by hand in its store.
    pub fn content_fingerprint(&self) -> Fingerprint {
        fingerprint(self)
    }

    /// Fills in the stored fingerprint if it is missing.
    ///
    /// Returns true if the field was filled.
    pub fn ensure_fingerprint(&mut self) -> bool {
        if self.fingerprint.is_some() {
            return false;
        }
        self.fingerprint = Some(self.content_fingerprint());
        true
    }

    /// Returns true if both identifiers are present and the link flag is set.
    pub fn is_linked(&self) -> bool {
        self.linked && self.primary_id.is_some() && self.secondary_id.is_some()
    }

    /// Returns a copy of `self` carrying `other`'s content fields.
    ///
    /// Identifiers and the origin timestamp stay those of `self`. The
    /// fingerprint is recomputed for the new content and the record is
    /// marked linked.
    pub fn with_content_of(&self, other: &Record) -> Record {
        let mut merged = Record {
            text: other.text.clone(),
            category: other.category.clone(),
            effective_date: other.effective_date,
            linked: true,
            ..self.clone()
        };
        merged.fingerprint = Some(merged.content_fingerprint());
        merged
    }

    /// Short identifier for log lines.
    pub fn label(&self) -> &str {
        self.primary_id
            .as_deref()
            .or(self.secondary_id.as_deref())
            .unwrap_or("<new>")
    }
}

/// Parses a date that may be a plain `YYYY-MM-DD` or a full ISO timestamp.
///
/// Only the date part is kept. Returns `None` for blank or unparsable input.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    let date_part = trimmed.split('T').next().unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part.trim(), "%Y-%m-%d").ok()
}

/// Parses an RFC 3339 timestamp, falling back to a zone-less ISO timestamp
/// interpreted as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

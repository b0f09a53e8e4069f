//! Per-pass statistics.

use crate::error::ApplyError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tandem_protocol::DeltaSummary;
use tandem_stores::TranslationError;
use uuid::Uuid;

/// Counters and errors for one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Unique id of the pass.
    pub run_id: Uuid,
    /// Whether mutations were suppressed.
    pub dry_run: bool,
    /// When the pass started.
    pub started_at: DateTime<Utc>,
    /// When the pass finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// Records fetched from the primary store.
    pub primary_records: usize,
    /// Records fetched from the secondary store.
    pub secondary_records: usize,
    /// Missing fingerprints written back to their origin store.
    pub fingerprints_backfilled: usize,
    /// Records created in the primary store.
    pub created_in_primary: usize,
    /// Records created in the secondary store.
    pub created_in_secondary: usize,
    /// Content updates written to the primary store.
    pub updated_in_primary: usize,
    /// Content updates written to the secondary store.
    pub updated_in_secondary: usize,
    /// Link marks written to either store.
    pub linked: usize,
    /// Creates withheld because the counterpart failed to translate.
    pub quarantined: usize,
    /// Items skipped because they could not be translated.
    pub skipped: Vec<TranslationError>,
    /// Writes that failed.
    pub errors: Vec<ApplyError>,
    /// Sizes of the computed delta.
    pub planned: Option<DeltaSummary>,
    /// The error that aborted the pass, if any.
    pub fatal: Option<String>,
}

impl RunStatistics {
    /// Starts statistics for a new pass.
    pub fn new(run_id: Uuid, dry_run: bool) -> Self {
        Self {
            run_id,
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            primary_records: 0,
            secondary_records: 0,
            fingerprints_backfilled: 0,
            created_in_primary: 0,
            created_in_secondary: 0,
            updated_in_primary: 0,
            updated_in_secondary: 0,
            linked: 0,
            quarantined: 0,
            skipped: Vec::new(),
            errors: Vec::new(),
            planned: None,
            fatal: None,
        }
    }

    /// Records a failed write.
    pub fn record_error(&mut self, error: ApplyError) {
        self.errors.push(error);
    }

    /// Marks the end of the pass.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Records created in either store.
    pub fn created(&self) -> usize {
        self.created_in_primary + self.created_in_secondary
    }

    /// Content updates in either store.
    pub fn updated(&self) -> usize {
        self.updated_in_primary + self.updated_in_secondary
    }

    /// Every recorded error: failed writes, skipped items and the fatal error.
    pub fn error_count(&self) -> usize {
        self.errors.len() + self.skipped.len() + usize::from(self.fatal.is_some())
    }

    /// Returns true if the pass recorded no error of any kind.
    pub fn is_success(&self) -> bool {
        self.error_count() == 0
    }

    /// Human-readable error lines, fatal error first.
    pub fn error_details(&self) -> Vec<String> {
        self.fatal
            .iter()
            .cloned()
            .chain(self.skipped.iter().map(ToString::to_string))
            .chain(self.errors.iter().map(ToString::to_string))
            .collect()
    }

    /// Wall time of the pass, up to now if still running.
    pub fn duration(&self) -> Duration {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).to_std().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_status() {
        let mut stats = RunStatistics::new(Uuid::new_v4(), false);
        assert!(stats.is_success());

        stats.created_in_primary = 2;
        stats.created_in_secondary = 1;
        stats.updated_in_secondary = 4;
        assert_eq!(stats.created(), 3);
        assert_eq!(stats.updated(), 4);

        stats.skipped.push(TranslationError::new("page-1", "bad date"));
        stats.record_error(ApplyError::new("create in primary", "page-2", "HTTP 400"));
        stats.fatal = Some("fetching from primary store failed".into());
        assert_eq!(stats.error_count(), 3);
        assert!(!stats.is_success());

        let details = stats.error_details();
        assert_eq!(details[0], "fetching from primary store failed");
        assert_eq!(details[1], "cannot translate page-1: bad date");
        assert_eq!(details[2], "create in primary page-2: HTTP 400");
    }

    #[test]
    fn duration_is_measured() {
        let mut stats = RunStatistics::new(Uuid::new_v4(), true);
        stats.finish();
        assert!(stats.finished_at.unwrap() >= stats.started_at);
        assert!(stats.duration() < Duration::from_secs(5));
    }
}

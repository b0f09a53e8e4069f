//! The durable health document.
//!
//! One JSON document describes the most recent pass. It is overwritten after
//! every pass, fatal or not, and read by `tandem report` and by external
//! dashboards. Writes go to a temporary file in the same directory which is
//! then renamed over the document, so readers never see a torn write.

use crate::error::{SyncError, SyncResult};
use crate::stats::RunStatistics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Outcome of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// No error of any kind was recorded.
    Success,
    /// At least one error was recorded.
    Error,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Success => f.write_str("success"),
            HealthStatus::Error => f.write_str("error"),
        }
    }
}

/// Counters published in the health document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCounts {
    /// Records fetched from the primary store.
    pub primary_records: usize,
    /// Records fetched from the secondary store.
    pub secondary_records: usize,
    /// Records created in either store.
    pub created: usize,
    /// Content updates in either store.
    pub updated: usize,
    /// Always zero; deletions are never propagated.
    pub deleted: usize,
    /// Link marks written.
    pub linked: usize,
    /// Every recorded error.
    pub errors: usize,
    /// Items skipped by translation.
    pub skipped: usize,
    /// Missing fingerprints written back.
    pub fingerprints_backfilled: usize,
    /// Creates withheld because the counterpart failed to translate.
    #[serde(default)]
    pub quarantined: usize,
}

/// The health document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthState {
    /// When the pass finished.
    pub last_run: DateTime<Utc>,
    /// Overall outcome.
    pub status: HealthStatus,
    /// Wall time of the pass.
    pub duration_seconds: f64,
    /// Unique id of the pass.
    pub run_id: Uuid,
    /// Whether mutations were suppressed.
    #[serde(default)]
    pub dry_run: bool,
    /// Counters.
    pub statistics: HealthCounts,
    /// One line per recorded error.
    pub error_details: Vec<String>,
}

impl HealthState {
    /// Builds the document for a finished pass.
    pub fn from_statistics(stats: &RunStatistics) -> Self {
        let status = if stats.is_success() {
            HealthStatus::Success
        } else {
            HealthStatus::Error
        };
        Self {
            last_run: stats.finished_at.unwrap_or_else(Utc::now),
            status,
            duration_seconds: (stats.duration().as_secs_f64() * 1000.0).round() / 1000.0,
            run_id: stats.run_id,
            dry_run: stats.dry_run,
            statistics: HealthCounts {
                primary_records: stats.primary_records,
                secondary_records: stats.secondary_records,
                created: stats.created(),
                updated: stats.updated(),
                deleted: 0,
                linked: stats.linked,
                errors: stats.error_count(),
                skipped: stats.skipped.len(),
                fingerprints_backfilled: stats.fingerprints_backfilled,
                quarantined: stats.quarantined,
            },
            error_details: stats.error_details(),
        }
    }

    /// Returns true if the pass succeeded.
    pub fn is_success(&self) -> bool {
        self.status == HealthStatus::Success
    }
}

/// Reads and writes the health document at a fixed path.
#[derive(Debug, Clone)]
pub struct HealthStore {
    path: PathBuf,
}

impl HealthStore {
    /// Creates a store for the document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the document, or `None` if no pass has run yet.
    pub fn load(&self) -> SyncResult<Option<HealthState>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.error(e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| self.error(e))
    }

    /// Atomically replaces the document with `state`.
    pub fn save(&self, state: &HealthState) -> SyncResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| self.error(e))?;

        let mut file = tempfile::NamedTempFile::new_in(&dir).map_err(|e| self.error(e))?;
        serde_json::to_writer_pretty(&mut file, state).map_err(|e| self.error(e))?;
        file.write_all(b"\n").map_err(|e| self.error(e))?;
        file.as_file().sync_all().map_err(|e| self.error(e))?;
        file.persist(&self.path).map_err(|e| self.error(e.error))?;
        Ok(())
    }

    fn error(&self, err: impl fmt::Display) -> SyncError {
        SyncError::Health {
            path: self.path.clone(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApplyError;
    use tempfile::TempDir;

    fn finished(dry_run: bool) -> RunStatistics {
        let mut stats = RunStatistics::new(Uuid::new_v4(), dry_run);
        stats.primary_records = 4;
        stats.secondary_records = 3;
        stats.created_in_secondary = 1;
        stats.updated_in_primary = 2;
        stats.finish();
        stats
    }

    #[test]
    fn document_from_statistics() {
        let stats = finished(false);
        let state = HealthState::from_statistics(&stats);

        assert_eq!(state.status, HealthStatus::Success);
        assert_eq!(state.run_id, stats.run_id);
        assert_eq!(state.statistics.created, 1);
        assert_eq!(state.statistics.updated, 2);
        assert_eq!(state.statistics.deleted, 0);
        assert!(state.error_details.is_empty());

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "success");
        assert!(json["last_run"].is_string());
        assert!(json["duration_seconds"].is_number());
        assert_eq!(json["statistics"]["primary_records"], 4);
    }

    #[test]
    fn any_error_marks_the_document() {
        let mut stats = finished(false);
        stats.record_error(ApplyError::new("update in secondary", "page-1", "HTTP 409"));

        let state = HealthState::from_statistics(&stats);
        assert_eq!(state.status, HealthStatus::Error);
        assert_eq!(state.statistics.errors, 1);
        assert_eq!(state.error_details, vec!["update in secondary page-1: HTTP 409"]);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = HealthStore::new(dir.path().join("logs").join("last_success.json"));
        assert_eq!(store.load().unwrap(), None);

        let first = HealthState::from_statistics(&finished(false));
        store.save(&first).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.run_id, first.run_id);
        assert_eq!(loaded.last_run, first.last_run);
        assert_eq!(loaded.statistics, first.statistics);

        let second = HealthState::from_statistics(&finished(true));
        store.save(&second).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.run_id, second.run_id);
        assert!(loaded.dry_run);

        let entries = std::fs::read_dir(dir.path().join("logs")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn corrupt_document_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("health.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = HealthStore::new(&path).load().unwrap_err();
        assert!(matches!(err, SyncError::Health { .. }));
    }
}

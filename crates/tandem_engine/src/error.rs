//! Error types for the sync engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tandem_protocol::Side;
use tandem_stores::StoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration could not be resolved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Required keys are absent or empty.
    #[error("missing required configuration: {}", .0.join(", "))]
    Missing(Vec<String>),

    /// A key is present but cannot be parsed.
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        /// Configuration key.
        key: String,
        /// Raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Errors that abort a pass.
///
/// Failures of individual writes are not errors of this type; they are
/// recorded as [`ApplyError`]s and the pass continues.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration could not be resolved.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// A store was unreachable when the pass started.
    #[error("{store} store unreachable: {source}")]
    Connectivity {
        /// The failing store.
        store: Side,
        /// Underlying adapter error.
        source: StoreError,
    },

    /// A full fetch failed after exhausting retries.
    #[error("fetching from {store} store failed: {source}")]
    Fetch {
        /// The failing store.
        store: Side,
        /// Underlying adapter error.
        source: StoreError,
    },

    /// Another pass holds the pass lock.
    #[error("a sync pass is already in progress")]
    PassInProgress,

    /// The health document could not be read or written.
    #[error("health state at {}: {message}", .path.display())]
    Health {
        /// Path of the health document.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// The pass lock file could not be opened.
    #[error("pass lock at {}: {message}", .path.display())]
    Lock {
        /// Path of the lock file.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// Invalid state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// The async runtime failed to run a pass.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl SyncError {
    /// Returns true if this error stems from configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(self, SyncError::Configuration(_))
    }
}

/// One create, update or link call that failed during a pass.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{action} {record}: {message}")]
pub struct ApplyError {
    /// What was attempted, e.g. `create in secondary`.
    pub action: String,
    /// Label of the record involved.
    pub record: String,
    /// Error message.
    pub message: String,
}

impl ApplyError {
    /// Creates an apply error.
    pub fn new(
        action: impl Into<String>,
        record: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            record: record.into(),
            message: message.into(),
        }
    }
}

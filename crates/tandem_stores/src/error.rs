//! Error types for the store adapters.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type for adapter operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to a store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The request did not complete within the per-call timeout.
    #[error("request timed out")]
    Timeout,

    /// The store asked us to slow down (HTTP 429).
    #[error("rate limited by store")]
    RateLimited {
        /// Delay requested by the store, if it sent one.
        retry_after: Option<Duration>,
    },

    /// The store answered with a non-2xx status.
    #[error("store returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A record could not be translated to or from the native shape.
    #[error(transparent)]
    Translation(#[from] TranslationError),

    /// An operation needed an identifier the record does not have.
    #[error("record has no {0} identifier")]
    MissingId(&'static str),

    /// Every attempt failed.
    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Operation label.
        operation: String,
        /// Number of attempts made.
        attempts: u32,
        /// The error from the final attempt.
        last: Box<StoreError>,
    },
}

impl StoreError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Transport { retryable, .. } => *retryable,
            StoreError::Timeout => true,
            StoreError::RateLimited { .. } => true,
            StoreError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns true if the store rejected the call before processing it.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, StoreError::RateLimited { .. })
    }
}

/// A native item that could not be mapped into a `Record`, or the reverse.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("cannot translate {item}: {reason}")]
pub struct TranslationError {
    /// Native identifier of the offending item, or a placeholder.
    pub item: String,
    /// Counterpart identifier found on the item before translation failed.
    pub counterpart: Option<String>,
    /// What went wrong.
    pub reason: String,
}

impl TranslationError {
    /// Creates a translation error for `item`.
    pub fn new(item: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            counterpart: None,
            reason: reason.into(),
        }
    }

    /// Records the counterpart link found on the failing item.
    pub fn with_counterpart(mut self, counterpart: Option<String>) -> Self {
        self.counterpart = counterpart;
        self
    }
}

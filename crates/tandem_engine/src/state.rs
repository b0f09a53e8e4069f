//! Pass state machine.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the orchestrator is within a pass.
///
/// A pass walks `Idle → Connecting → Fetching → Reconciling → Applying →
/// Persisting → Idle`. `Error` is reachable from every state; a failed pass
/// still moves through `Persisting` so the health document reflects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// No pass is running.
    Idle,
    /// Probing both stores.
    Connecting,
    /// Fetching both record sets and backfilling fingerprints.
    Fetching,
    /// Computing the delta.
    Reconciling,
    /// Writing the delta to the stores.
    Applying,
    /// Writing the health document.
    Persisting,
    /// The pass hit a fatal error.
    Error,
}

impl SyncState {
    /// Returns true while a pass is in flight.
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncState::Idle | SyncState::Error)
    }

    /// Returns true if a new pass may start from this state.
    pub fn can_start_pass(&self) -> bool {
        matches!(self, SyncState::Idle | SyncState::Error)
    }

    /// Returns true if `next` may follow this state.
    pub fn can_transition_to(&self, next: SyncState) -> bool {
        use SyncState::*;
        match (self, next) {
            (_, Error) => true,
            (Idle | Error, Connecting) => true,
            (Connecting, Fetching) => true,
            (Fetching, Reconciling) => true,
            (Reconciling, Applying) => true,
            (Applying | Error, Persisting) => true,
            (Persisting, Idle) => true,
            _ => false,
        }
    }

    /// Checks a transition, returning the new state.
    pub fn transition(self, next: SyncState) -> SyncResult<SyncState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(SyncError::InvalidStateTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// Lower-case state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Connecting => "connecting",
            SyncState::Fetching => "fetching",
            SyncState::Reconciling => "reconciling",
            SyncState::Applying => "applying",
            SyncState::Persisting => "persisting",
            SyncState::Error => "error",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

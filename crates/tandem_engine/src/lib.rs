//! # Tandem Engine
//!
//! Pass orchestration for tandem.
//!
//! This crate provides:
//! - `SyncConfig`, resolved from the environment with fail-fast validation
//! - `Orchestrator`, which runs one connect/fetch/reconcile/apply/persist pass
//! - The pass state machine
//! - `RunStatistics` and the durable health document
//! - A cross-process pass lock
//! - `Scheduler`, a tokio-driven periodic trigger
//!
//! ## Key Invariants
//!
//! - Passes never overlap, in-process or across processes sharing a lock file
//! - A failed fetch aborts the pass before anything is written
//! - A failed write is recorded and the pass continues
//! - The health document is rewritten after every attempted pass

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod health;
mod lock;
mod orchestrator;
mod plan;
mod scheduler;
mod state;
mod stats;

pub use config::SyncConfig;
pub use error::{ApplyError, ConfigError, ConfigResult, SyncError, SyncResult};
pub use health::{HealthCounts, HealthState, HealthStatus, HealthStore};
pub use lock::PassLock;
pub use orchestrator::{Orchestrator, PassReport};
pub use plan::{PlanEntry, SyncPlan, PLAN_SAMPLE_SIZE};
pub use scheduler::{ScheduleSummary, Scheduler};
pub use state::SyncState;
pub use stats::RunStatistics;

/// Version of the engine crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

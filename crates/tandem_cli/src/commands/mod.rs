//! CLI command implementations.

pub mod report;
pub mod run;
pub mod schedule;

use std::process::ExitCode;
use tandem_engine::{ConfigError, HealthStore, Orchestrator, SyncConfig, SyncError};
use tandem_stores::{PrimaryStore, ReqwestClient, SecondaryStore, StoreError};
use thiserror::Error;

/// Orchestrator over the live HTTP adapters.
pub type LiveOrchestrator =
    Orchestrator<PrimaryStore<ReqwestClient>, SecondaryStore<ReqwestClient>>;

/// How a command finished when it did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to report.
    Clean,
    /// A pass completed but recorded errors.
    RecordedErrors,
}

impl Outcome {
    /// Numeric exit status.
    pub fn code(self) -> u8 {
        match self {
            Outcome::Clean => 0,
            Outcome::RecordedErrors => 1,
        }
    }

    /// Process exit code for this outcome.
    pub fn exit_code(self) -> ExitCode {
        ExitCode::from(self.code())
    }
}

/// Errors surfaced to the command line.
#[derive(Debug, Error)]
pub enum CliError {
    /// Required settings missing or malformed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An HTTP client could not be built.
    #[error("could not build HTTP client: {0}")]
    Client(#[from] StoreError),

    /// A pass failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Output could not be rendered.
    #[error("could not render output: {0}")]
    Render(#[from] serde_json::Error),

    /// The async runtime could not start.
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl CliError {
    /// Numeric exit status: 2 for configuration problems, 1 otherwise.
    pub fn code(&self) -> u8 {
        match self {
            CliError::Config(_) => 2,
            CliError::Sync(err) if err.is_configuration() => 2,
            _ => 1,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }
}

/// Reads the configuration from the environment.
pub fn load_config() -> Result<SyncConfig, CliError> {
    Ok(SyncConfig::from_env()?)
}

/// Wires both HTTP adapters, the health store and the pass lock.
pub fn build_orchestrator(config: &SyncConfig) -> Result<LiveOrchestrator, CliError> {
    let primary = PrimaryStore::new(
        ReqwestClient::new(config.request_timeout)?,
        config.primary_config(),
    )
    .with_retry(config.retry_policy());
    let secondary = SecondaryStore::new(
        ReqwestClient::new(config.request_timeout)?,
        config.secondary_config(),
    )
    .with_mapping(config.schema_mapping())
    .with_retry(config.retry_policy());

    Ok(Orchestrator::new(primary, secondary, HealthStore::new(&config.health_file))
        .with_lock_file(config.lock_file()))
}

//! Schedule command implementation.

use super::run::{outcome_for, render_summary};
use super::{build_orchestrator, load_config, CliError, Outcome};
use std::sync::Arc;
use tandem_engine::Scheduler;
use tracing::{info, warn};

/// Runs the schedule command.
///
/// Adapters are built before the runtime starts; their blocking HTTP
/// clients must not be created inside an async context.
pub fn run(once: bool, dry_run: bool) -> Result<Outcome, CliError> {
    let config = load_config()?;
    let orchestrator = Arc::new(build_orchestrator(&config)?);
    let scheduler = Scheduler::new(orchestrator, config.interval).with_dry_run(dry_run);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    if once {
        return match runtime.block_on(scheduler.run_once()) {
            Ok(report) => {
                println!("{}", render_summary(&report.statistics));
                Ok(outcome_for(&report.statistics))
            }
            Err(err) => {
                if let Some(stats) = scheduler.orchestrator().last_run() {
                    println!("{}", render_summary(&stats));
                }
                Err(err.into())
            }
        };
    }

    let summary = runtime.block_on(scheduler.run_forever(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for ctrl-c, stopping");
        }
    }));
    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped = summary.skipped,
        "scheduler stopped"
    );
    println!(
        "{} passes: {} succeeded, {} failed, {} skipped",
        summary.passes(),
        summary.succeeded,
        summary.failed,
        summary.skipped
    );

    Ok(if summary.failed > 0 {
        Outcome::RecordedErrors
    } else {
        Outcome::Clean
    })
}

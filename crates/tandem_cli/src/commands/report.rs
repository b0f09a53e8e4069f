//! Report command implementation.

use super::{CliError, Outcome};
use std::path::Path;
use tandem_engine::{HealthState, HealthStore, SyncConfig};

/// Runs the report command.
///
/// Only the health file location is read from the environment, so a report
/// works on hosts without store credentials.
pub fn run(json: bool) -> Result<Outcome, CliError> {
    let path = SyncConfig::health_file_from_env();
    print!("{}", render(&path, json)?);
    Ok(Outcome::Clean)
}

/// Renders the health document at `path`.
pub fn render(path: &Path, json: bool) -> Result<String, CliError> {
    let Some(state) = HealthStore::new(path).load()? else {
        return Ok("no previous runs\n".to_string());
    };
    if json {
        return Ok(format!("{}\n", serde_json::to_string(&state)?));
    }
    Ok(render_text(&state))
}

fn render_text(state: &HealthState) -> String {
    let counts = &state.statistics;
    let mut out = format!(
        "Last run:     {} ({})\n",
        state.last_run.to_rfc3339(),
        state.run_id
    );
    out.push_str(&format!(
        "Status:       {}{}\n",
        state.status,
        if state.dry_run { " (dry run)" } else { "" }
    ));
    out.push_str(&format!("Duration:     {:.3}s\n", state.duration_seconds));
    out.push_str(&format!(
        "Records:      {} primary, {} secondary\n",
        counts.primary_records, counts.secondary_records
    ));
    out.push_str(&format!(
        "Changes:      {} created, {} updated, {} linked\n",
        counts.created, counts.updated, counts.linked
    ));
    out.push_str(&format!(
        "Errors:       {} ({} skipped items)\n",
        counts.errors, counts.skipped
    ));
    for detail in &state.error_details {
        out.push_str(&format!("  - {detail}\n"));
    }
    out
}

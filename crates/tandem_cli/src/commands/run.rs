//! Run command implementation.

use super::{build_orchestrator, load_config, CliError, Outcome};
use tandem_engine::{PassReport, PlanEntry, RunStatistics, SyncPlan};
use tandem_protocol::DeltaSummary;

/// Errors printed under a summary.
const ERRORS_SHOWN: usize = 5;

/// Runs the run command.
pub fn run(dry_run: bool, json: bool) -> Result<Outcome, CliError> {
    let config = load_config()?;
    let orchestrator = build_orchestrator(&config)?;

    match orchestrator.run_pass(dry_run) {
        Ok(report) => {
            print_report(&report, json)?;
            Ok(outcome_for(&report.statistics))
        }
        Err(err) => {
            // An aborted pass still leaves statistics behind.
            if let Some(stats) = orchestrator.last_run() {
                if json {
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                } else {
                    println!("{}", render_summary(&stats));
                }
            }
            Err(err.into())
        }
    }
}

/// Exit outcome for a completed pass.
pub fn outcome_for(stats: &RunStatistics) -> Outcome {
    if stats.is_success() {
        Outcome::Clean
    } else {
        Outcome::RecordedErrors
    }
}

fn print_report(report: &PassReport, json: bool) -> Result<(), CliError> {
    let stats = &report.statistics;
    match (json, stats.dry_run) {
        (true, true) => println!("{}", serde_json::to_string_pretty(&report.plan())?),
        (true, false) => println!("{}", serde_json::to_string_pretty(stats)?),
        (false, true) => {
            println!("{}", render_plan(&report.plan()));
            println!("{}", render_summary(stats));
        }
        (false, false) => println!("{}", render_summary(stats)),
    }
    Ok(())
}

/// Renders counts plus the first few errors.
pub fn render_summary(stats: &RunStatistics) -> String {
    let mut out = String::new();
    let mode = if stats.dry_run { " (dry run)" } else { "" };
    let status = if stats.fatal.is_some() {
        "aborted"
    } else {
        "finished"
    };
    out.push_str(&format!(
        "Pass {} {status} in {:.2}s{mode}\n",
        stats.run_id,
        stats.duration().as_secs_f64()
    ));
    out.push_str(&format!(
        "  Records:      {} primary, {} secondary\n",
        stats.primary_records, stats.secondary_records
    ));
    out.push_str(&format!(
        "  Created:      {} in primary, {} in secondary\n",
        stats.created_in_primary, stats.created_in_secondary
    ));
    out.push_str(&format!(
        "  Updated:      {} in primary, {} in secondary\n",
        stats.updated_in_primary, stats.updated_in_secondary
    ));
    out.push_str(&format!("  Linked:       {}\n", stats.linked));
    if stats.fingerprints_backfilled > 0 {
        out.push_str(&format!(
            "  Backfilled:   {} fingerprints\n",
            stats.fingerprints_backfilled
        ));
    }
    if stats.quarantined > 0 {
        out.push_str(&format!("  Quarantined:  {}\n", stats.quarantined));
    }
    out.push_str(&format!("  Errors:       {}", stats.error_count()));

    let details = stats.error_details();
    for detail in details.iter().take(ERRORS_SHOWN) {
        out.push_str(&format!("\n    - {detail}"));
    }
    if details.len() > ERRORS_SHOWN {
        out.push_str(&format!("\n    ... and {} more", details.len() - ERRORS_SHOWN));
    }
    out
}

/// Renders a dry-run plan.
pub fn render_plan(plan: &SyncPlan) -> String {
    let mut out = format!("Planned changes: {}\n", plan.summary.total());
    out.push_str(&render_counts(&plan.summary));
    let lists = [
        ("Create in primary", &plan.create_in_primary),
        ("Create in secondary", &plan.create_in_secondary),
        ("Update in primary", &plan.update_in_primary),
        ("Update in secondary", &plan.update_in_secondary),
    ];
    for (title, entries) in lists {
        if entries.is_empty() {
            continue;
        }
        out.push_str(&format!("\n{title}:\n"));
        for entry in entries {
            out.push_str(&render_entry(entry));
        }
    }
    out
}

fn render_counts(summary: &DeltaSummary) -> String {
    format!(
        "  create: {} in primary, {} in secondary\n  update: {} in primary, {} in secondary ({} link only)\n",
        summary.create_in_primary,
        summary.create_in_secondary,
        summary.update_in_primary,
        summary.update_in_secondary,
        summary.link_only
    )
}

fn render_entry(entry: &PlanEntry) -> String {
    let marker = if entry.link_only { " [link]" } else { "" };
    format!(
        "  {:<12} {} ({}){marker}\n",
        entry.id, entry.excerpt, entry.category
    )
}

//! Tandem CLI
//!
//! Command-line entry points for keeping a primary store and a secondary
//! page store in step.
//!
//! # Commands
//!
//! - `run` - Run one reconciliation pass
//! - `report` - Print the health document of the last pass
//! - `schedule` - Run passes on the configured interval
//! - `version` - Show version information
//!
//! Exit codes: 0 on success, 1 when a pass recorded errors or failed, 2 on a
//! configuration error.

mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Bidirectional sync between a relational store and a page store.
#[derive(Parser)]
#[command(name = "tandem")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation pass
    Run {
        /// Compute the delta without writing to either store
        #[arg(short, long)]
        dry_run: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the health document of the last pass
    Report {
        /// Print the raw document
        #[arg(long)]
        json: bool,
    },

    /// Run passes on the configured interval until interrupted
    Schedule {
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,

        /// Compute deltas without writing to either store
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let outcome = match cli.command {
        Commands::Run { dry_run, json } => commands::run::run(dry_run, json),
        Commands::Report { json } => commands::report::run(json),
        Commands::Schedule { once, dry_run } => commands::schedule::run(once, dry_run),
        Commands::Version => {
            println!("tandem CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("tandem engine v{}", tandem_engine::VERSION);
            Ok(commands::Outcome::Clean)
        }
    };

    match outcome {
        Ok(outcome) => outcome.exit_code(),
        Err(err) => {
            eprintln!("error: {err}");
            err.exit_code()
        }
    }
}

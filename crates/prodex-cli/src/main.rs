//! prodex CLI - Productization Planner
//!
//! Plans and applies the productized subset of a multi-module source tree.
//! `apply` edits the tree in place; `check` computes the same edits in a
//! scratch copy and reports any difference.

mod config;
mod exit;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::RunArgs;
use exit::ExitCode;
use prodex_engine::{Mode, Orchestrator, RunOutcome};
use std::process;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "prodex")]
#[command(author, version, about = "Productization planner for multi-module source trees", long_about = None)]
struct Cli {
    /// Verbose output (-v info, -vv debug, -vvv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Edit the source tree to its productized state
    Apply(RunArgs),

    /// Verify the source tree is already in its productized state
    Check(RunArgs),
}

fn main() -> process::ExitCode {
    // Usage errors exit 1, exit 2 means CHECK diffs
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = if e.use_stderr() {
                ExitCode::Failure
            } else {
                ExitCode::Success
            };
            return code.into();
        }
    };
    init_tracing(cli.verbose);

    let (mode, args) = match cli.command {
        Commands::Apply(args) => (Mode::Apply, args),
        Commands::Check(args) => (Mode::Check, args),
    };

    match run(mode, args) {
        Ok(outcome) => {
            print_summary(&outcome);
            ExitCode::Success.into()
        }
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from_error(&e).into()
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn run(mode: Mode, args: RunArgs) -> Result<RunOutcome> {
    let file = args.load_file_config()?;
    let config = args.into_planner_config(file);
    let basedir = config.basedir.clone();
    Orchestrator::new(config)
        .run(mode)
        .with_context(|| format!("prodex {} failed in {}", mode, basedir.display()))
}

fn print_summary(outcome: &RunOutcome) {
    let Some(plan) = &outcome.plan else {
        println!("prodex {}: skipped", outcome.mode);
        return;
    };
    println!(
        "prodex {}: {} productized module(s), {} test group(s)",
        outcome.mode,
        plan.expanded_includes_with_tests.len(),
        plan.groups.len()
    );
    if !outcome.diffs.is_empty() {
        println!("{} file(s) differ from the computed tree", outcome.diffs.len());
    }
}

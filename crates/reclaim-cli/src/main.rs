mod commands;
mod logging;
mod progress;

use std::process;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, ExecutionArgs, ReplayArgs, RunArgs};
use dotenv::dotenv;
use progress::CliReporter;
use reclaim_core::config::{self, GrouperKind};
use reclaim_core::{AppConfig, DedupeEngine, RunOutcome};
use tracing::{error, info};

/// Run finished and every row is `ok` or `skip`.
const EXIT_OK: i32 = 0;
/// Run finished but the ledger has `error` rows.
const EXIT_FILE_ERRORS: i32 = 1;
/// Run aborted before executing anything.
const EXIT_SETUP: i32 = 2;

fn main() {
    dotenv().ok();

    let code = {
        let _guard = logging::init_logger();
        run_cli(Cli::parse())
    };
    process::exit(code);
}

fn run_cli(args: Cli) -> i32 {
    let loaded = match &args.config {
        Some(path) => config::load_configuration_from(path),
        None => config::load_configuration(),
    };
    let mut config = match loaded {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            return EXIT_SETUP;
        }
    };

    let result = match args.command {
        Some(Commands::Run(run_args)) => {
            apply_run_overrides(&mut config, run_args);
            execute(config, |engine, reporter| engine.run(reporter))
        }
        Some(Commands::Replay(ReplayArgs { plan, execution })) => {
            apply_execution_overrides(&mut config, execution);
            execute(config, |engine, reporter| engine.replay(&plan, reporter))
        }
        Some(Commands::PrintConfig) => toml::to_string_pretty(&config)
            .map(|rendered| {
                println!("{}", rendered);
                EXIT_OK
            })
            .map_err(anyhow::Error::from),
        None => {
            let _ = Cli::command().print_long_help();
            Ok(EXIT_OK)
        }
    };

    result.unwrap_or_else(|err| {
        error!("Error: {:#}", err);
        EXIT_SETUP
    })
}

fn apply_execution_overrides(config: &mut AppConfig, execution: ExecutionArgs) {
    if let Some(dry_run) = execution.dry_run_override() {
        config.dry_run = dry_run;
    }
    if let Some(output_dir) = execution.output_dir {
        config.output_dir = output_dir;
    }
}

fn apply_run_overrides(config: &mut AppConfig, args: RunArgs) {
    if let Some(root) = args.root {
        config.root_path = root;
    }
    if !args.include.is_empty() {
        config.include_patterns = args.include;
    }
    if !args.exclude.is_empty() {
        config.exclude_patterns = args.exclude;
    }
    if let Some(command) = args.external {
        config.grouper.kind = GrouperKind::External;
        config.grouper.command = Some(command);
        config.grouper.args = args.external_args;
    }
    apply_execution_overrides(config, args.execution);
}

fn execute<F>(config: AppConfig, action: F) -> anyhow::Result<i32>
where
    F: FnOnce(&DedupeEngine, &CliReporter) -> reclaim_core::Result<RunOutcome>,
{
    let engine = DedupeEngine::new(config).context("invalid configuration")?;
    let reporter = CliReporter::new();
    let outcome = action(&engine, &reporter)?;

    print_tally(&outcome, engine.config().dry_run);

    Ok(if outcome.summary.is_success() {
        EXIT_OK
    } else {
        EXIT_FILE_ERRORS
    })
}

fn print_tally(outcome: &RunOutcome, dry_run: bool) {
    println!();
    if outcome.files_enumerated > 0 {
        info!(
            "Enumerate: {}, Group: {}, Execute: {}",
            format!("{:.2}s", outcome.enumerate_duration.as_secs_f64()).green(),
            format!("{:.2}s", outcome.group_duration.as_secs_f64()).green(),
            format!("{:.2}s", outcome.execute_duration.as_secs_f64()).green(),
        );
        info!(
            "{} files enumerated, {} duplicate groups",
            format!("{}", outcome.files_enumerated).cyan(),
            format!("{}", outcome.duplicate_groups).cyan(),
        );
    }

    let verb = if dry_run { "would delete" } else { "deleted" };
    info!(
        "{} {}, {} skipped, {} errors, {} bytes reclaimed",
        verb,
        format!("{}", outcome.summary.deleted).green(),
        format!("{}", outcome.summary.skipped).yellow(),
        format!("{}", outcome.summary.errors).red(),
        format!("{}", outcome.summary.bytes_reclaimed).green(),
    );
    info!("Ledger: {}", outcome.ledger_path.display());
    info!("Summary: {}", outcome.summary_path.display());
}

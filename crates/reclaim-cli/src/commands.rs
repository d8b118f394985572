use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "reclaim")]
#[command(about = "Deterministic duplicate file reclaimer", long_about = None)]
pub struct Cli {
    /// Configuration file to load instead of ./Config.toml
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Find duplicates under ROOT and delete all but one copy of each
    Run(RunArgs),
    /// Apply a reviewed deletion plan (CSV: deleted_file,kept_file,size_bytes,reason,hash)
    Replay(ReplayArgs),
    /// Print the effective configuration as TOML
    PrintConfig,
}

/// Flags shared by every command that deletes.
#[derive(Debug, Args)]
pub struct ExecutionArgs {
    /// Write tombstones and the ledger but delete nothing
    #[arg(long, conflicts_with = "apply")]
    pub dry_run: bool,

    /// Actually delete files
    #[arg(long)]
    pub apply: bool,

    /// Directory that receives the per-run ledger and summary
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<String>,
}

impl ExecutionArgs {
    /// `None` when neither flag was given, leaving the configured value alone.
    pub fn dry_run_override(&self) -> Option<bool> {
        match (self.dry_run, self.apply) {
            (true, _) => Some(true),
            (false, true) => Some(false),
            (false, false) => None,
        }
    }
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Directory to deduplicate
    pub root: Option<String>,

    /// Only consider files matching this glob (repeatable)
    #[arg(long = "include", value_name = "GLOB")]
    pub include: Vec<String>,

    /// Ignore files matching this glob (repeatable)
    #[arg(long = "exclude", value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Use an external grouping tool instead of the built-in hasher
    #[arg(long, value_name = "CMD")]
    pub external: Option<String>,

    /// Argument for the external tool; `{list}` and `{output}` are substituted
    #[arg(long = "external-arg", value_name = "ARG", requires = "external", allow_hyphen_values = true)]
    pub external_args: Vec<String>,

    #[command(flatten)]
    pub execution: ExecutionArgs,
}

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// Plan file to apply
    pub plan: PathBuf,

    #[command(flatten)]
    pub execution: ExecutionArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_flags_parse() {
        let cli = Cli::parse_from([
            "reclaim",
            "run",
            "/data",
            "--exclude",
            "*.tmp",
            "--exclude",
            "cache/**",
            "--apply",
            "--external",
            "fclones-wrapper",
            "--external-arg",
            "{list}",
        ]);
        let Some(Commands::Run(args)) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.root.as_deref(), Some("/data"));
        assert_eq!(args.exclude, vec!["*.tmp", "cache/**"]);
        assert_eq!(args.execution.dry_run_override(), Some(false));
        assert_eq!(args.external_args, vec!["{list}"]);
    }

    #[test]
    fn test_dry_run_and_apply_conflict() {
        let result = Cli::try_parse_from(["reclaim", "replay", "plan.csv", "--dry-run", "--apply"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_no_flag_keeps_configured_mode() {
        let cli = Cli::parse_from(["reclaim", "--config", "alt.toml", "replay", "plan.csv"]);
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
        let Some(Commands::Replay(args)) = cli.command else {
            panic!("expected replay command");
        };
        assert_eq!(args.execution.dry_run_override(), None);
    }
}

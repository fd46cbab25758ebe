//! CLI argument parsing for the reconcile run.
//!
//! `apply` and `status` share one set of inputs so the read-only preview sees
//! exactly what a real run would.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "pref-reconcile",
    version,
    about = "Nudge Safari download-risk and Citrix auto-update preferences toward known-good values",
    after_help = "Commands:\n  apply                  Reconcile preferences and write changes\n  status                 Show what apply would change, without writing\n  config                 Print the default desired-state config\n\nExamples:\n  pref-reconcile apply\n  pref-reconcile status --json\n  pref-reconcile apply --config /Library/Management/prefs.json --no-verify\n  pref-reconcile apply --home /tmp/home --prefs-dir /tmp/prefs",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Apply(ApplyArgs),
    Status(StatusArgs),
    Config(ConfigArgs),
}

/// Inputs shared by `apply` and `status`.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// JSON config describing the desired state (default: built-in baseline)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Home directory of the console user (default: current user's home)
    #[arg(long, value_name = "DIR")]
    pub home: Option<PathBuf>,

    /// Read and write preference domains as JSON files in DIR instead of
    /// going through the system preference daemon
    #[arg(long, value_name = "DIR")]
    pub prefs_dir: Option<PathBuf>,

    /// Emit a machine-readable JSON report after the log
    #[arg(long)]
    pub json: bool,

    /// Emit debug diagnostics on stderr
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Reconcile preferences and write changes")]
pub struct ApplyArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Skip reading values back after writing them
    #[arg(long)]
    pub no_verify: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Show what apply would change, without writing")]
pub struct StatusArgs {
    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Parser, Debug)]
#[command(about = "Print the default desired-state config")]
pub struct ConfigArgs {}

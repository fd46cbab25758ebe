use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod prefs;
mod reconcile;
mod report;
mod risk;
mod safari;
mod workflow;

use cli::{Command, RootArgs};

fn main() -> Result<()> {
    let args = RootArgs::parse();

    match args.command {
        Command::Apply(args) => {
            init_tracing(args.run.verbose);
            workflow::run_apply(&args)
        }
        Command::Status(args) => {
            init_tracing(args.run.verbose);
            workflow::run_status(&args)
        }
        Command::Config(_) => workflow::run_config(),
    }
}

/// Diagnostics go to stderr so stdout stays the decision log.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

use crate::cli::{ApplyArgs, RunArgs, StatusArgs};
use crate::config::{config_stub, resolve_config};
use crate::prefs::{DefaultsStore, JsonDirStore, PreferenceStore};
use crate::reconcile::{Reconciler, RunOptions};
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

pub fn run_apply(args: &ApplyArgs) -> Result<()> {
    let options = RunOptions {
        dry_run: false,
        verify: !args.no_verify,
    };
    run_reconcile(&args.run, options)
}

pub fn run_status(args: &StatusArgs) -> Result<()> {
    let options = RunOptions {
        dry_run: true,
        verify: false,
    };
    run_reconcile(&args.run, options)
}

pub fn run_config() -> Result<()> {
    println!("{}", config_stub()?);
    Ok(())
}

fn run_reconcile(args: &RunArgs, options: RunOptions) -> Result<()> {
    let config = resolve_config(args.config.as_deref())?;
    let home = resolve_home(args.home.as_deref())?;
    let store = open_store(args.prefs_dir.as_deref());
    tracing::debug!(
        home = %home.display(),
        dry_run = options.dry_run,
        verify = options.verify,
        "starting reconcile"
    );

    let mut reconciler = Reconciler::new(store, options);
    reconciler.run(&config, &home)?;
    let report = reconciler.into_report();
    tracing::info!(
        decisions = report.decisions.len(),
        changed = report.changed(),
        writes = report.writes,
        verified = report.verified,
        "reconcile complete"
    );

    if args.json {
        let text = serde_json::to_string_pretty(&report).context("serialize report")?;
        println!("{text}");
    }
    Ok(())
}

fn open_store(prefs_dir: Option<&Path>) -> Box<dyn PreferenceStore> {
    match prefs_dir {
        Some(dir) => Box::new(JsonDirStore::new(dir.to_path_buf())),
        None => Box::new(DefaultsStore::locate()),
    }
}

fn resolve_home(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))
}

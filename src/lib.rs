// src/lib.rs

pub mod artifacts;
pub mod cli;
pub mod config;
pub mod discover;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod pipeline;
pub mod results;
pub mod types;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{default_config_path, load_and_validate};
use crate::discover::{discover_tests, DiscoverySettings};
use crate::errors::{ErrorKind, PipelineError};
use crate::exec::SystemProcessTable;
use crate::fs::{FileSystem, RealFileSystem};
use crate::pipeline::{describe_plan, print_report, Pipeline};
use crate::types::{RequestedTestSet, TestId};

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// This wires together:
/// - workspace and config resolution
/// - test discovery (for `--list` or when no `--test` is given)
/// - the run pipeline
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<i32> {
    let workspace = resolve_workspace(args.workspace.clone())?;
    let (config_path, explicit) = match &args.config {
        Some(p) => (p.clone(), true),
        None => (default_config_path(&workspace), false),
    };
    let cfg = load_and_validate(&config_path, explicit)?;
    debug!(workspace = %workspace.display(), config = %config_path.display(), "resolved inputs");

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    if args.list {
        let settings = DiscoverySettings::from_config(&cfg)
            .map_err(|e| PipelineError::ConfigError(format!("{e:#}")))?;
        for id in discover_tests(fs.as_ref(), &workspace, &settings)? {
            println!("{id}");
        }
        return Ok(0);
    }

    let requested = requested_tests(&args, fs.as_ref(), &workspace, &cfg)?;
    let pipeline = Pipeline::new(cfg, &workspace, fs, Arc::new(SystemProcessTable));

    if args.dry_run {
        let plan = pipeline.plan()?;
        print!("{}", describe_plan(&plan, pipeline.config(), &requested));
        debug!("dry-run complete (no execution)");
        return Ok(0);
    }

    // Ctrl-C -> cancel the run; stages clean up before we return.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("Ctrl+C received; cancelling run");
            cancel.cancel();
        });
    }

    info!(tests = requested.len(), workspace = %workspace.display(), "starting run");
    let report = pipeline.run(&requested, &cancel).await;
    print_report(&report)?;
    Ok(report.exit_code())
}

/// Exit code for an error that escaped [`run`] before a report existed.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<PipelineError>().map(PipelineError::kind) {
        Some(ErrorKind::User) | Some(ErrorKind::Config) => 2,
        Some(ErrorKind::Cancel) => 130,
        Some(ErrorKind::Run) | None => 1,
    }
}

fn resolve_workspace(flag: Option<PathBuf>) -> Result<PathBuf> {
    let dir = match flag {
        Some(dir) => dir,
        None => std::env::current_dir().map_err(|e| {
            PipelineError::UserError(format!("no workspace: cannot read current directory: {e}"))
        })?,
    };
    if !dir.is_dir() {
        return Err(PipelineError::UserError(format!(
            "workspace {} is not a directory",
            dir.display()
        ))
        .into());
    }
    Ok(dir)
}

fn requested_tests(
    args: &CliArgs,
    fs: &dyn FileSystem,
    workspace: &std::path::Path,
    cfg: &config::ConfigFile,
) -> Result<RequestedTestSet> {
    if !args.tests.is_empty() {
        return Ok(args
            .tests
            .iter()
            .map(|t| TestId::from_type_path(t.trim()))
            .collect());
    }

    let settings = DiscoverySettings::from_config(cfg)
        .map_err(|e| PipelineError::ConfigError(format!("{e:#}")))?;
    let found = discover_tests(fs, workspace, &settings)?;
    info!(discovered = found.len(), "no --test given; running every discovered test");
    Ok(found.into_iter().collect())
}

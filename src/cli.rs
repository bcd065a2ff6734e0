// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `dmtest`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dmtest",
    version,
    about = "Compile a DreamMaker project with focused unit tests, run them in DreamDaemon and report the results.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Dmtest.toml` in the workspace root. A missing default file
    /// means "use built-in defaults"; a missing explicit file is an error.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Workspace root containing the project's `.dme`.
    ///
    /// Default: the current working directory.
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Test to run, without the `/datum/unit_test/` prefix. Repeatable.
    ///
    /// If omitted, every discovered test is run.
    #[arg(long = "test", value_name = "ID")]
    pub tests: Vec<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DMTEST_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Print discovered tests and exit.
    #[arg(long)]
    pub list: bool,

    /// Validate config, print the run plan, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

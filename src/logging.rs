// src/logging.rs

//! Logging for `dmtest`: `tracing` events rendered by `tracing-subscriber`
//! on stderr, so stdout carries only the test report.
//!
//! The chosen level applies to `dmtest` itself. Dependencies (the file
//! watcher, the process table) are capped at `warn`, because their debug
//! chatter drowns out the pipeline stages.
//!
//! Level priority:
//! 1. `--log-level`
//! 2. `DMTEST_LOG`, either a plain level (`debug`) or full filter
//!    directives (`dmtest::exec=trace,notify=debug`)
//! 3. `info`

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "DMTEST_LOG";

/// Target under which every `dmtest` event is emitted.
const CRATE_TARGET: &str = "dmtest";

/// Install the global subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env_value = std::env::var(LOG_ENV_VAR).ok();
    let directives = resolve_directives(cli_level, env_value.as_deref());
    let filter = EnvFilter::try_new(&directives)
        .with_context(|| format!("invalid {LOG_ENV_VAR} filter '{directives}'"))?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;

    Ok(())
}

fn resolve_directives(cli_level: Option<LogLevel>, env_value: Option<&str>) -> String {
    if let Some(lvl) = cli_level {
        return crate_directives(level_from_log_level(lvl));
    }

    match env_value.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => match parse_level_str(s) {
            Some(level) => crate_directives(level),
            None if s.contains('=') => s.to_string(),
            None => crate_directives(Level::INFO),
        },
        None => crate_directives(Level::INFO),
    }
}

/// `dmtest` at `level`; everything else at `level` or `warn`, whichever is
/// quieter.
fn crate_directives(level: Level) -> String {
    let others = std::cmp::min(level, Level::WARN);
    format!(
        "{},{CRATE_TARGET}={}",
        others.as_str().to_ascii_lowercase(),
        level.as_str().to_ascii_lowercase()
    )
}

fn level_from_log_level(lvl: LogLevel) -> Level {
    match lvl {
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

// src/config/validate.rs

use std::time::Duration;

use globset::Glob;
use regex::Regex;

use crate::config::model::{ConfigFile, RawConfigFile, FOCUS_PLACEHOLDER};
use crate::errors::{PipelineError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = PipelineError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_paths(&raw)?;
        validate_focus_template(&raw.project.focus_template)?;
        validate_log_location(&raw)?;
        validate_globs(&raw)?;

        let finished_pattern = compile_regex("daemon.finished_pattern", &raw.daemon.finished_pattern)?;
        let discovery_pattern = compile_regex("discovery.pattern", &raw.discovery.pattern)?;
        if discovery_pattern.captures_len() < 2 {
            return Err(PipelineError::ConfigError(format!(
                "discovery.pattern must contain a capture group for the test id (got '{}')",
                raw.discovery.pattern
            )));
        }

        let timeout = match raw.daemon.timeout.as_deref() {
            Some(s) => Some(parse_duration(s).map_err(|e| {
                PipelineError::ConfigError(format!("daemon.timeout: {e}"))
            })?),
            None => None,
        };

        Ok(ConfigFile::new_unchecked(raw, finished_pattern, discovery_pattern, timeout))
    }
}

fn validate_paths(cfg: &RawConfigFile) -> Result<()> {
    if cfg.compiler.path.trim().is_empty() {
        return Err(PipelineError::ConfigError(
            "compiler.path must not be empty".to_string(),
        ));
    }
    if cfg.daemon.path.trim().is_empty() {
        return Err(PipelineError::ConfigError(
            "daemon.path must not be empty".to_string(),
        ));
    }
    if let Some(name) = &cfg.project.name {
        if name.trim().is_empty() || name.contains(['/', '\\']) {
            return Err(PipelineError::ConfigError(format!(
                "project.name must be a bare file stem (got '{name}')"
            )));
        }
    }
    Ok(())
}

/// The focus template must carry exactly one placeholder.
pub fn validate_focus_template(template: &str) -> Result<()> {
    match template.matches(FOCUS_PLACEHOLDER).count() {
        1 => Ok(()),
        0 => Err(PipelineError::ConfigError(format!(
            "focus template '{template}' is missing the {FOCUS_PLACEHOLDER} placeholder"
        ))),
        n => Err(PipelineError::ConfigError(format!(
            "focus template '{template}' contains {n} {FOCUS_PLACEHOLDER} placeholders (expected exactly one)"
        ))),
    }
}

fn validate_log_location(cfg: &RawConfigFile) -> Result<()> {
    let file = cfg.daemon.log_file.trim();
    if file.is_empty() || file.contains(['/', '\\']) {
        return Err(PipelineError::ConfigError(format!(
            "daemon.log_file must be a plain file name (got '{}')",
            cfg.daemon.log_file
        )));
    }
    Ok(())
}

fn validate_globs(cfg: &RawConfigFile) -> Result<()> {
    for pat in &cfg.discovery.include {
        Glob::new(pat).map_err(|e| {
            PipelineError::ConfigError(format!("invalid discovery glob '{pat}': {e}"))
        })?;
    }
    Ok(())
}

fn compile_regex(field: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| PipelineError::ConfigError(format!("{field} is not a valid regex: {e}")))
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_config_error(raw: RawConfigFile, needle: &str) {
        match ConfigFile::try_from(raw) {
            Err(PipelineError::ConfigError(msg)) => {
                assert!(msg.contains(needle), "unexpected message: {msg}")
            }
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = ConfigFile::try_from(RawConfigFile::default()).unwrap();
        assert_eq!(cfg.compiler().path, "DreamMaker");
        assert_eq!(cfg.project().focus_template, "TEST_FOCUS({0})");
        assert_eq!(cfg.results_path().to_string_lossy(), "data/unit_tests.json");
        assert!(cfg.finished_pattern().is_match("Rebooting world"));
        assert_eq!(cfg.daemon_timeout(), None);
    }

    #[test]
    fn template_placeholder_count_is_enforced() {
        let mut raw = RawConfigFile::default();
        raw.project.focus_template = "TEST_FOCUS()".to_string();
        expect_config_error(raw, "missing");

        let mut raw = RawConfigFile::default();
        raw.project.focus_template = "{0} {0}".to_string();
        expect_config_error(raw, "exactly one");
    }

    #[test]
    fn bad_regex_and_timeout_are_rejected() {
        let mut raw = RawConfigFile::default();
        raw.daemon.finished_pattern = "(".to_string();
        expect_config_error(raw, "finished_pattern");

        let mut raw = RawConfigFile::default();
        raw.daemon.timeout = Some("10 parsecs".to_string());
        expect_config_error(raw, "daemon.timeout");

        let mut raw = RawConfigFile::default();
        raw.discovery.pattern = "^/datum/unit_test/".to_string();
        expect_config_error(raw, "capture group");
    }

    #[test]
    fn empty_executable_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.daemon.path = "  ".to_string();
        expect_config_error(raw, "daemon.path");
    }

    #[test]
    fn durations_parse() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("3s"), Ok(Duration::from_secs(3)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("5d").is_err());
    }
}
